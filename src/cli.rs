use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "application launch supervisor")]
pub struct Args {
    /// Sub‑commands (serve, watch)
    #[command(subcommand)]
    pub sub: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Answer JSON requests on stdin/stdout (default if no sub‑command)
    Serve {
        /// Path to configuration file
        #[arg(long, short = 'c')]
        config: Option<String>,

        /// Monitor sweep interval in milliseconds (overrides the config file)
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Launch one command and wait for it (Exit 0 = completed, 1 = crashed or failed)
    Watch {
        /// Path to configuration file
        #[arg(long, short = 'c')]
        config: Option<String>,

        /// Monitor sweep interval in milliseconds (overrides the config file)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Id to track the launch under
        app_id: String,

        /// Executable followed by its arguments. The executable path may
        /// contain spaces; arguments are split on whitespace.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}
