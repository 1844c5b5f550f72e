use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pastebridged", about = "Clipboard to file-input relay")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the session orchestrator daemon
    Orchestrator {
        /// Helper surface window width
        #[arg(long, default_value_t = 480)]
        surface_width: u32,

        /// Helper surface window height
        #[arg(long, default_value_t = 320)]
        surface_height: u32,
    },

    /// Run a clipboard access surface (spawned by the orchestrator)
    Surface {
        #[arg(long, default_value_t = 480)]
        width: u32,

        #[arg(long, default_value_t = 320)]
        height: u32,
    },

    /// Query or change per-site interception preferences
    Pref {
        #[command(subcommand)]
        action: PrefAction,
    },
}

#[derive(Subcommand)]
pub enum PrefAction {
    /// Show whether interception is enabled for a site
    Get { site: String },

    /// Enable interception for a site
    Enable { site: String },

    /// Disable interception for a site
    Disable { site: String },

    /// Remove the stored preference, reverting the site to the default
    Clear { site: String },
}
