use crate::evaluate::EvaluateArgs;
use crate::train::TrainArgs;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "Bi-Real Net training toolchain", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a BiRealNet on an image folder dataset
    Train(TrainArgs),

    /// Evaluate a saved checkpoint on `<data>/val`
    Evaluate(EvaluateArgs),
}
