// src/cli.rs
//! Command-line interface. Every setting comes from the environment (or `.env`);
//! the CLI only picks what to run.

use clap::{Parser, Subcommand};

use crate::region::Region;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Collect the last BACKFILL_MONTHS of news for every enabled region
    Backfill,
    /// Collect the past week for every enabled region (default)
    Weekly,
    /// Check configuration and report artifact status
    Test,
    /// Run weekly on SCHEDULE_DAY at SCHEDULE_TIME until interrupted
    Schedule,
    /// Run the weekly pipeline for one region
    Region {
        /// uk_na, emea, apac or latam
        region: Region,
    },
    /// Send a random existing report to verify email delivery
    Email,
    /// Reclassify a region's artifact and write a highlighted audit workbook
    Audit {
        region: Region,
    },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Weekly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_weekly() {
        let cli = Cli::parse_from(["hangar-watch"]);
        assert_eq!(cli.command(), Command::Weekly);
    }

    #[test]
    fn region_arguments_parse() {
        let cli = Cli::parse_from(["hangar-watch", "region", "emea"]);
        assert_eq!(cli.command(), Command::Region { region: Region::Emea });
        let cli = Cli::parse_from(["hangar-watch", "audit", "UK_NA"]);
        assert_eq!(cli.command(), Command::Audit { region: Region::UkNa });
    }

    #[test]
    fn unknown_region_is_rejected() {
        assert!(Cli::try_parse_from(["hangar-watch", "region", "mars"]).is_err());
    }
}
