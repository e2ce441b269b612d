// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::PathBuf;

use clap::Parser;

use crate::cmd::add::add_card;
use crate::cmd::add::parse_grammeme;
use crate::cmd::remove::remove_card;
use crate::cmd::stats::StatsFormat;
use crate::cmd::stats::print_owner_stats;
use crate::config::Config;
use crate::error::Fallible;
use crate::server::start_server;
use crate::types::card::CardId;
use crate::types::card::OwnerId;

#[derive(Parser)]
#[command(version, about, long_about = None)]
enum Command {
    /// Serve flashcard sessions over HTTP.
    Serve {
        /// Path to the configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Path to the SQLite database.
        #[arg(long)]
        database: Option<PathBuf>,
        /// Address to listen on.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Add a card to a learner's deck.
    Add {
        #[arg(long)]
        owner: String,
        /// The phrase to study.
        #[arg(long)]
        phrase: String,
        /// The translation that counts as a correct answer.
        #[arg(long)]
        translation: String,
        /// A grammatical tag, as `key=value`. May be repeated.
        #[arg(long = "grammeme", value_parser = parse_grammeme)]
        grammemes: Vec<(String, String)>,
        #[arg(long)]
        database: Option<PathBuf>,
    },
    /// Delete a card.
    Remove {
        #[arg(long)]
        card_id: i64,
        #[arg(long)]
        database: Option<PathBuf>,
    },
    /// Print deck and session statistics for a learner.
    Stats {
        #[arg(long)]
        owner: String,
        /// Output format.
        #[arg(long, default_value_t = StatsFormat::Text)]
        format: StatsFormat,
        #[arg(long)]
        database: Option<PathBuf>,
    },
}

pub async fn entrypoint() -> Fallible<()> {
    let cli: Command = Command::parse();
    match cli {
        Command::Serve {
            config,
            database,
            bind,
        } => {
            let config = Config::load(config.as_deref())?.with_overrides(database, bind);
            start_server(config).await
        }
        Command::Add {
            owner,
            phrase,
            translation,
            grammemes,
            database,
        } => {
            let config = Config::load(None)?.with_overrides(database, None);
            let id = add_card(
                config.database_path()?,
                OwnerId::new(owner),
                &phrase,
                &translation,
                grammemes,
            )?;
            println!("{id}");
            Ok(())
        }
        Command::Remove { card_id, database } => {
            let config = Config::load(None)?.with_overrides(database, None);
            remove_card(config.database_path()?, CardId::new(card_id))
        }
        Command::Stats {
            owner,
            format,
            database,
        } => {
            let config = Config::load(None)?.with_overrides(database, None);
            print_owner_stats(config.database_path()?, OwnerId::new(owner), format)
        }
    }
}
