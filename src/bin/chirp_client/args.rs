//! Command-line surface for `chirp-client`.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "chirp-client", version, about = "Chirp terminal client", long_about = None)]
pub struct Cli {
    /// Server base URL.
    #[arg(long, env = "CHIRP_SITE_URL", default_value = "http://127.0.0.1:3000")]
    pub site: String,

    /// Session token; prefer the env var to keep it out of shell history
    #[arg(long, hide = true, env = "CHIRP_SESSION")]
    pub session: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the global feed
    Feed,
    /// Show a profile, e.g. `profile @alice`
    Profile {
        /// Profile slug, `@username`
        slug: String,
    },
    /// Post a new chirp as the signed-in user
    Post {
        /// Post content
        content: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_profile_slug() {
        let cli = Cli::parse_from(["chirp-client", "--site", "http://example.test", "profile", "@alice"]);
        assert_eq!(cli.site, "http://example.test");
        assert!(matches!(cli.command, Commands::Profile { ref slug } if slug == "@alice"));
    }

    #[test]
    fn site_has_a_default() {
        let cli = Cli::parse_from(["chirp-client", "feed"]);
        assert_eq!(cli.site, "http://127.0.0.1:3000");
        assert!(matches!(cli.command, Commands::Feed));
    }
}
