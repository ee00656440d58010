//! Facility Console - Main Entry Point
//!
//! Operator command line for the facility-monitoring backend.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, info};

use facility_console_lib::{
    config::Config,
    logging,
    models::{ChecklistId, ExecutionId, SiteId, ZoneId},
    resources::{Page, Resource, Resources},
    stats, AppState,
};

#[derive(Parser)]
#[command(name = "facility-console")]
#[command(about = "Operator console for the facility-monitoring platform", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend base URL (overrides FACILITY_API_URL)
    #[arg(long, global = true)]
    url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Exchange credentials for a session token
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long, env = "FACILITY_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Camera, checklist and execution counts
    Dashboard,
    /// Execution outcome summary
    Report,
    List {
        kind: Kind,
        #[arg(long, default_value_t = 0)]
        offset: u32,
        #[arg(long)]
        limit: Option<u32>,
        /// Zones of this site
        #[arg(long, conflicts_with_all = ["zone", "checklist"])]
        site: Option<u64>,
        /// Cameras in this zone
        #[arg(long, conflicts_with = "checklist")]
        zone: Option<u64>,
        /// Executions of this checklist
        #[arg(long)]
        checklist: Option<u64>,
    },
    Get {
        kind: Kind,
        id: u64,
    },
    Delete {
        kind: Kind,
        id: u64,
    },
    /// Mark an execution completed
    Complete {
        execution_id: u64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Sites,
    Zones,
    Cameras,
    Checklists,
    Templates,
    Executions,
    Users,
}

/// Run `$body` with `$r` bound to the resource handle for `$kind`
macro_rules! with_resources {
    ($api:expr, $kind:expr, |$r:ident| $body:expr) => {
        match $kind {
            Kind::Sites => { let $r = $api.sites(); $body }
            Kind::Zones => { let $r = $api.zones(); $body }
            Kind::Cameras => { let $r = $api.cameras(); $body }
            Kind::Checklists => { let $r = $api.checklists(); $body }
            Kind::Templates => { let $r = $api.templates(); $body }
            Kind::Executions => { let $r = $api.executions(); $body }
            Kind::Users => { let $r = $api.users(); $body }
        }
    };
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?.with_api_url(cli.url.as_deref())?;

    logging::init(&config.log_dir);
    info!("Facility console starting against {}", config.api_url);

    let state = AppState::new(config)?;
    let revocations = state.api.transport().revocations();

    let result = run(&state, cli.command).await;

    // One notice per ended session, however many requests saw the 401.
    if revocations.has_changed().unwrap_or(false) {
        eprintln!("Session expired. Run `facility-console login` to sign in again.");
    }

    result
}

async fn run(state: &AppState, command: Commands) -> Result<()> {
    match command {
        Commands::Login { username, password } => {
            let user = state.session.login(&username, &password).await?;
            println!("Logged in as {} ({})", user.username, user.display_name());
            Ok(())
        }
        Commands::Logout => {
            state.session.logout();
            println!("Logged out");
            Ok(())
        }
        command => {
            if state.session.restore().await?.is_none() {
                bail!("Not logged in. Run `facility-console login` first.");
            }
            run_authenticated(state, command).await
        }
    }
}

async fn run_authenticated(state: &AppState, command: Commands) -> Result<()> {
    let api = &state.api;
    let page = state.config.page();

    match command {
        Commands::Login { .. } | Commands::Logout => {}
        Commands::Whoami => print_json(&state.session.session())?,
        Commands::Dashboard => {
            let (cameras, checklists, executions) = tokio::try_join!(
                api.cameras().list(page),
                api.checklists().list(page),
                api.executions().list(page),
            )?;
            print_json(&stats::dashboard_stats(&cameras, &checklists, &executions))?;
        }
        Commands::Report => {
            let executions = api.executions().list(page).await?;
            print_json(&stats::report_stats(&executions))?;
        }
        Commands::List { kind, offset, limit, site, zone, checklist } => {
            let page = Page::new(offset, limit.unwrap_or(page.limit));
            match (kind, site, zone, checklist) {
                (Kind::Zones, Some(site), None, None) => {
                    print_json(&api.zones().list_for_site(SiteId(site), page).await?)?
                }
                (Kind::Cameras, None, Some(zone), None) => {
                    print_json(&api.cameras().list_for_zone(ZoneId(zone), page).await?)?
                }
                (Kind::Executions, None, None, Some(checklist)) => print_json(
                    &api.executions().list_for_checklist(ChecklistId(checklist), page).await?,
                )?,
                (_, None, None, None) => {
                    with_resources!(api, kind, |r| print_json(&r.list(page).await?))?
                }
                _ => bail!("--site, --zone and --checklist filter zones, cameras and executions respectively"),
            }
        }
        Commands::Get { kind, id } => {
            with_resources!(api, kind, |r| get(r, id).await)?;
        }
        Commands::Delete { kind, id } => {
            with_resources!(api, kind, |r| delete(r, id).await)?;
            println!("Deleted");
        }
        Commands::Complete { execution_id } => {
            print_json(&api.executions().complete(ExecutionId(execution_id)).await?)?;
        }
    }
    Ok(())
}

async fn get<R>(resources: Resources<'_, R>, id: u64) -> Result<()>
where
    R: Resource + Serialize,
    R::Id: From<u64>,
{
    let entity = resources.get(R::Id::from(id)).await?;
    print_json(&entity)
}

async fn delete<R>(resources: Resources<'_, R>, id: u64) -> Result<()>
where
    R: Resource,
    R::Id: From<u64>,
{
    debug!("Deleting {} {}", R::NAME, id);
    resources.delete(R::Id::from(id)).await?;
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("rendering output")?;
    println!("{}", rendered);
    Ok(())
}
