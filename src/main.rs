//! polka - run container pipelines described in YAML
//!
//! ## Commands
//!
//! - `polka run` - Execute every stage of `docker-pipeline.yml` in order
//! - `polka check` - Validate a pipeline and print its stages
//! - `polka completions` - Generate shell completions
//!
//! ## Quick Start
//!
//! ```bash
//! # Validate a pipeline
//! polka check -f docker-pipeline.yml
//!
//! # Run it with debug logging
//! polka run -f docker-pipeline.yml --verbose
//!
//! # Generate shell completions
//! polka completions bash > /etc/bash_completion.d/polka
//! ```

use std::process::ExitCode;

mod cli;

#[tokio::main]
async fn main() -> ExitCode {
    match cli::run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if std::env::var("POLKA_VERBOSE").is_ok() {
                eprintln!("{e:?}");
            }
            ExitCode::FAILURE
        }
    }
}
