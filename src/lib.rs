pub mod logging;

pub mod sde;
pub mod envs;
pub mod components;
pub mod agents;
pub mod engines;

pub mod cli;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum RunMode {
    Train,
    Test,
}
