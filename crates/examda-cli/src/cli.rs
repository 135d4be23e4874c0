use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "examda")]
#[command(about = "Offline-first exam reminders from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List upcoming exams
    #[command(alias = "ls")]
    List {
        /// Only exams inside this window
        #[arg(short, long, value_enum)]
        filter: Option<ListFilter>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one exam
    Show {
        /// Exam id: `r<N>` or `<N>` for synced exams, `l<N>` for local ones
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a new exam
    #[command(alias = "new")]
    Add {
        /// Exam name
        #[arg(long)]
        name: String,
        /// Start time (RFC 3339, e.g. 2026-06-01T09:00:00Z)
        #[arg(long, value_name = "DATETIME")]
        at: String,
        /// Optional description
        #[arg(long)]
        description: Option<String>,
        /// Reminder offsets in minutes before the exam
        #[arg(long = "remind", value_name = "MINUTES", num_args = 1..)]
        remind: Vec<u32>,
    },
    /// Edit an existing exam
    Edit {
        /// Exam id
        id: String,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New start time (RFC 3339)
        #[arg(long, value_name = "DATETIME")]
        at: Option<String>,
        /// New description
        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,
        /// Remove the description
        #[arg(long)]
        clear_description: bool,
        /// Replace reminder offsets (minutes)
        #[arg(long = "remind", value_name = "MINUTES", num_args = 1.., conflicts_with = "clear_reminders")]
        remind: Vec<u32>,
        /// Remove every reminder
        #[arg(long)]
        clear_reminders: bool,
    },
    /// Mark an exam complete and collect its coins
    #[command(alias = "done")]
    Complete {
        /// Exam id
        id: String,
    },
    /// Delete an exam
    #[command(alias = "rm")]
    Delete {
        /// Exam id
        id: String,
    },
    /// Reconcile the local store with the server
    Sync {
        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show connectivity and pending changes
    Status,
    /// Show the signed-in profile (cached when offline)
    Profile {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change the account password
    Password {
        /// New password (at least 6 characters)
        #[arg(long)]
        new_password: String,
    },
    /// Browse and buy shop items
    Shop {
        #[command(subcommand)]
        command: Option<ShopCommands>,
    },
    /// Manage owned items
    Inventory {
        #[command(subcommand)]
        command: Option<InventoryCommands>,
    },
    /// Sign in, sign out, or check the session
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Configure the CLI
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ListFilter {
    ThisWeek,
    ThisMonth,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
}

#[derive(Subcommand)]
pub enum ShopCommands {
    /// Buy an item with coins
    Buy {
        /// Shop item id
        item_id: i64,
    },
}

#[derive(Subcommand)]
pub enum InventoryCommands {
    /// Equip an owned item
    Equip {
        /// Item id
        item_id: i64,
    },
    /// Unequip the current item
    Unequip,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Sign in with student id and password and store the token in the keychain
    Login {
        /// Student id
        #[arg(long, value_name = "ID")]
        student_id: String,
        /// Account password
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Show whether a token is stored
    Status,
    /// Forget the token and wipe local data
    Logout,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Create or update the config file
    Init {
        /// Examda API base URL
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Database path used when `--db-path` is not given
        #[arg(long, value_name = "PATH")]
        default_db_path: Option<PathBuf>,
        /// Seconds between background syncs
        #[arg(long, value_name = "SECS")]
        sync_interval_secs: Option<u64>,
    },
    /// Print the effective configuration
    Show,
}
