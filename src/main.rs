use {
    anyhow::Result,
    clap::Parser,
    gsde_rl::cli::{
        run,
        Args,
    },
};

fn main() -> Result<()> {
    run(Args::parse())
}
