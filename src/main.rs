// Entrypoint for the CLI application.
// - Keeps `main` small: set up logging and the environment, then hand the
//   terminal capabilities to the UI loop.
// - Maps the session result onto the process exit code.

use std::io::stdout;
use std::process::ExitCode;
use std::time::Duration;

use crossterm::cursor::Show;
use crossterm::execute;
use crossterm::style::Stylize;
use tracing_subscriber::EnvFilter;

use s3_uploader::config::load_env_files;
use s3_uploader::error::{is_interrupt, AppError};
use s3_uploader::output::Console;
use s3_uploader::picker::Browser;
use s3_uploader::prompt::Terminal;
use s3_uploader::s3::S3Backend;
use s3_uploader::storage::{Interrupt, TransferConfig};
use s3_uploader::ui::App;

/// How long Ctrl-C waits for multipart uploads to be aborted.
const ABORT_GRACE: Duration = Duration::from_secs(10);

fn main() -> ExitCode {
    init_logging();
    load_env_files();

    // Ctrl-C is a normal way out: let running multipart uploads abort, then
    // restore the cursor dialoguer may have hidden and leave with status 0.
    let interrupt = Interrupt::default();
    let handler = interrupt.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if !handler.raise_and_wait(ABORT_GRACE) {
            tracing::warn!("gave up waiting for multipart uploads to abort");
        }
        cancelled();
        std::process::exit(0);
    }) {
        tracing::warn!(error = %e, "could not install Ctrl-C handler");
    }

    match run(interrupt) {
        Ok(()) => ExitCode::SUCCESS,
        // These were already explained on screen.
        Err(AppError::MissingBucket) | Err(AppError::Connection(_)) => ExitCode::FAILURE,
        // Prompts read keys in raw mode and report Ctrl-C as an error.
        Err(AppError::Other(e)) if is_interrupt(&e) => {
            cancelled();
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("\n  {} {}\n", "Error:".red(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(interrupt: Interrupt) -> Result<(), AppError> {
    let picker = Browser::from_cwd()?;
    let app = App::new(Box::new(Terminal::new()), Box::new(picker), Console::sink());
    app.run(|config| {
        S3Backend::connect(config, TransferConfig::default()).map(|b| b.with_interrupt(interrupt))
    })
}

fn cancelled() {
    let _ = execute!(stdout(), Show);
    println!("\n\n  {}\n", "Operation cancelled".yellow());
}

/// Logs go to stderr so they never mix with the menus. Quiet unless
/// `S3_UPLOADER_LOG` or `RUST_LOG` asks for more.
fn init_logging() {
    let filter = EnvFilter::try_from_env("S3_UPLOADER_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
