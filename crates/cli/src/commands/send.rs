//! `send` command implementation.

use anyhow::Result;
use tracing::info;

use facade::AdvancedFacade;

use crate::cli::SendArgs;
use crate::error::CliError;

/// Execute the `send` command
///
/// Connects, queues the document and closes the connection; the document is
/// written before the socket closes.
pub fn run_send(args: &SendArgs) -> Result<()> {
    if !args.file.exists() {
        return Err(CliError::file_not_found(&args.file).into());
    }

    let facade = AdvancedFacade::new().map_err(CliError::Dataflow)?;
    facade.connect_to_server(&args.server).map_err(CliError::Server)?;
    facade.send_to_server_file(&args.file).map_err(CliError::Server)?;
    facade.disconnect();

    info!(server = %args.server, file = %args.file.display(), "Document sent");
    println!("✓ Sent {} to {}", args.file.display(), args.server);
    Ok(())
}
