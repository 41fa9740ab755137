use clap::Parser;
use mojiner_trainer::{run_training, TrainArgs};

fn main() {
    tracing_subscriber::fmt::init();

    let args = TrainArgs::parse();
    if let Err(e) = run_training(&args) {
        eprintln!("Training failed: {:#}", e);
        std::process::exit(1);
    }
}
