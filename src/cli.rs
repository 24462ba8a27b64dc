use clap::{Parser, Subcommand};

/// Default port for the API server
pub const DEFAULT_API_PORT: u16 = 48372;

#[derive(Parser, Debug)]
#[command(name = "shoplist")]
#[command(about = "A shopping list kept in plain-text to-do summaries", long_about = None)]
pub struct Cli {
    /// Override the configured list id
    #[arg(short, long, global = true)]
    pub list: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a config file with default settings
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Show the list (default if no command given)
    List {
        /// Include completed items
        #[arg(short, long)]
        completed: bool,
    },
    /// Add an item, or bump the quantity of one already on the list
    Add {
        /// e.g. `Eggs (12) [Dairy] // free range`
        text: Vec<String>,
    },
    /// Set an item's quantity (values below 1 become 1)
    Qty {
        item: String,
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Increase an item's quantity by one
    Inc { item: String },
    /// Decrease an item's quantity by one (never below 1)
    Dec { item: String },
    /// Toggle an item between active and completed
    Done { item: String },
    /// Remove an item
    Rm { item: String },
    /// Remove every completed item
    Clear,
    Rename { item: String, name: String },
    /// Set or clear (with an empty string) an item's notes
    Note { item: String, notes: String },
    /// Set or clear (with an empty string) an item's category
    Category { item: String, category: String },
    /// Autocomplete suggestions for a partial name
    Suggest { query: String },
    /// Run the HTTP API server in the foreground
    Serve {
        /// Port to run the server on
        #[arg(short, long, default_value_t = DEFAULT_API_PORT)]
        port: u16,
    },
}
