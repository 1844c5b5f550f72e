//! One-shot preference commands.
//!
//! Connects to the orchestrator as `Role::Control`, performs a single
//! preference request, prints the result, and exits. This is the
//! command-line face of the settings popup.

use pastebridged::client::{ClientError, RuntimeClient};
use pastebridged::ipc::protocol::Role;

use crate::cli::PrefAction;

pub async fn run(action: PrefAction) -> Result<(), ClientError> {
    let mut client = RuntimeClient::connect(Role::Control).await?;

    match action {
        PrefAction::Get { site } => {
            let enabled = client.get_preference(&site).await?;
            println!(
                "{site}: {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
        PrefAction::Enable { site } => {
            client.save_preference(&site, true).await?;
            println!("{site}: enabled");
        }
        PrefAction::Disable { site } => {
            client.save_preference(&site, false).await?;
            println!("{site}: disabled");
        }
        PrefAction::Clear { site } => {
            if client.clear_preference(&site).await? {
                println!("{site}: preference cleared");
            } else {
                println!("{site}: no stored preference");
            }
        }
    }

    Ok(())
}
