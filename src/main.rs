use anyhow::Result;
use ballot_server::api::build_rocket;
use ballot_server::config::Config;
use ballot_server::model::{ElectionState, NewCandidate};
use ballot_server::tally::ResultQuery;
use ballot_server::Ledger;
use clap::Parser;
use clap_repl::reedline::{DefaultPrompt, DefaultPromptSegment, FileBackedHistory};
use clap_repl::ClapEditor;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ballot-server", version, about = "Election ballot server")]
struct Cli {
    #[command(flatten)]
    config: Config,
    /// Start the HTTP server immediately instead of the admin console
    #[arg(long)]
    serve: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(name = "")]
pub enum Command {
    StartServer,
    ShowElection,
    SetState { state: ElectionState },
    ListCandidates,
    AddCandidate { name: String, party: String },
    Approve { id: u32 },
    Revoke { id: u32 },
    RemoveCandidate { id: u32 },
    ListVoters,
    AddVoter { wallet: String },
    Verify { id: String },
    Unverify { id: String },
    Results,
}

fn main() -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .compact()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let ledger = cli.config.open_ledger()?;
    if cli.serve {
        return rocket::execute(start_server(cli.config, ledger));
    }
    cli_main(cli.config, ledger)
}

fn process_command(command: Command, config: &Config, ledger: &Ledger) -> Result<()> {
    match command {
        Command::StartServer => {
            rocket::execute(start_server(config.clone(), ledger.clone()))?;
        }
        Command::ShowElection => {
            println!("{}", serde_json::to_string_pretty(&ledger.election()?)?);
        }
        Command::SetState { state } => {
            let election = ledger.transition(state)?;
            println!("Election is {}", election.state);
        }
        Command::ListCandidates => {
            for c in ledger.candidates()? {
                println!(
                    "{:>4} {:<24} {:<20} votes={} approved={}",
                    c.id, c.name, c.party, c.vote_count, c.is_approved
                );
            }
        }
        Command::AddCandidate { name, party } => {
            let c = ledger.add_candidate(NewCandidate {
                name,
                party,
                ..Default::default()
            })?;
            println!("Candidate {} added", c.id);
        }
        Command::Approve { id } => {
            if ledger.approve(id)?.is_none() {
                println!("No candidate {id}");
            }
        }
        Command::Revoke { id } => {
            if ledger.revoke(id)?.is_none() {
                println!("No candidate {id}");
            }
        }
        Command::RemoveCandidate { id } => {
            let c = ledger.remove_candidate(id)?;
            println!("Candidate {} removed ({} votes discarded)", c.id, c.vote_count);
        }
        Command::ListVoters => {
            for v in ledger.voters()? {
                println!(
                    "{} {} verified={} voted={}",
                    v.id, v.wallet_address, v.verified, v.has_voted
                );
            }
        }
        Command::AddVoter { wallet } => {
            let v = ledger.add_voter(&wallet)?;
            println!("Voter {} added for {}", v.id, v.wallet_address);
        }
        Command::Verify { id } => {
            ledger.verify(&id)?;
        }
        Command::Unverify { id } => {
            ledger.revoke_verification(&id)?;
        }
        Command::Results => {
            let tally = ledger.results(&ResultQuery::default())?;
            println!("{}", serde_json::to_string_pretty(&tally)?);
        }
    }
    Ok(())
}

pub fn cli_main(config: Config, ledger: Ledger) -> Result<()> {
    let prompt = DefaultPrompt {
        left_prompt: DefaultPromptSegment::Basic("ballot-cli".to_owned()),
        ..DefaultPrompt::default()
    };
    let rl = ClapEditor::<Command>::builder()
        .with_prompt(Box::new(prompt))
        .with_editor_hook(|reed| {
            match FileBackedHistory::with_file(10000, "/tmp/ballot-cli-history".into()) {
                Ok(history) => reed.with_history(Box::new(history)),
                Err(e) => {
                    tracing::warn!("history disabled: {e}");
                    reed
                }
            }
        })
        .build();
    rl.repl(|command| {
        if let Err(e) = process_command(command, &config, &ledger) {
            tracing::error!("{e}");
        }
    });

    Ok(())
}

pub async fn start_server(config: Config, ledger: Ledger) -> Result<()> {
    build_rocket(ledger, config)?.launch().await?;
    Ok(())
}
