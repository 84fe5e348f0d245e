use clap::{Parser, Subcommand, ValueEnum};
use readykit_core::ResultKind;

#[derive(Parser, Debug)]
#[command(name = "readykit")]
#[command(version, about = "Offline cache, FAQ assistant and results log for readykit")]
pub struct Cli {
    /// Origin that relative asset URLs resolve against
    #[arg(long, global = true, env = "READYKIT_ORIGIN")]
    pub origin: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch every configured asset into a new cache generation
    Install,

    /// Remove stale cache generations and start serving the current one
    Activate,

    /// Serve a URL through the cache
    Fetch {
        url: String,
        /// Treat the request as a page navigation (falls back to the app shell)
        #[arg(long)]
        document: bool,
    },

    /// Ask the assistant a question
    Ask {
        #[arg(required = true)]
        query: Vec<String>,
        /// Skip the online lookup stage. It is also skipped on its own when
        /// loading the FAQ corpus could not reach the origin.
        #[arg(long)]
        offline: bool,
    },

    /// Resync emergency contacts into the local store
    Sync {
        /// Keep resyncing on the configured interval until interrupted
        #[arg(long)]
        watch: bool,
    },

    /// Show cache, contacts and results status
    Status,

    /// Quiz and game results
    Results {
        #[command(subcommand)]
        command: ResultsCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum ResultsCommand {
    /// List stored results, newest first
    List {
        #[arg(long)]
        user: Option<String>,
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Record a result
    Add {
        #[arg(long, value_enum)]
        kind: KindArg,
        /// Quiz or game identifier
        #[arg(long)]
        subject: String,
        #[arg(long)]
        score: f64,
        #[arg(long)]
        total: Option<f64>,
        /// Signed-in user email; omitted means guest
        #[arg(long)]
        user: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindArg {
    Quiz,
    Game,
}

impl From<KindArg> for ResultKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Quiz => ResultKind::Quiz,
            KindArg::Game => ResultKind::Game,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ask_with_words() {
        let cli = Cli::parse_from(["readykit", "ask", "--offline", "what", "if", "flood"]);
        match cli.command {
            Command::Ask { query, offline } => {
                assert_eq!(query, vec!["what", "if", "flood"]);
                assert!(offline);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn parse_results_add() {
        let cli = Cli::parse_from([
            "readykit", "results", "add", "--kind", "quiz", "--subject", "fire", "--score", "4",
            "--total", "5",
        ]);
        match cli.command {
            Command::Results {
                command: ResultsCommand::Add { kind, score, total, user, .. },
            } => {
                assert_eq!(kind, KindArg::Quiz);
                assert_eq!(score, 4.0);
                assert_eq!(total, Some(5.0));
                assert!(user.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn fetch_requires_url() {
        assert!(Cli::try_parse_from(["readykit", "fetch"]).is_err());
    }
}
