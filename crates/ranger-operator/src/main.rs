use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use ranger_operator::{
    cli::{Command, Opts, SyncArguments, ValidateArguments},
    client::{BuildClientError, Credentials, RangerClient},
    config::{self, UserGroupConfiguration},
    constants::APP_NAME,
    handler::{self, Outcome, Trigger, UserGroupSync},
    logging,
    reconciler::Reconciler,
    relation::{self, PolicyRelation},
    state::{self, FileStateStore},
};
use snafu::{ResultExt, Snafu, ensure};

const LOG_ENV: &str = "RANGER_OPERATOR_LOG";

const EXIT_SUCCESS: u8 = 0;
const EXIT_ERROR: u8 = 1;
/// `EX_TEMPFAIL`: the trigger should be delivered again later.
const EXIT_DEFERRED: u8 = 75;

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize logging"))]
    InitLogging { source: logging::Error },

    #[snafu(display("failed to read user-group configuration {path:?}"))]
    ReadConfiguration {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("invalid user-group configuration {path:?}"))]
    InvalidConfiguration {
        path: PathBuf,
        source: config::Error,
    },

    #[snafu(display("scopes {scopes:?} do not match a related service"))]
    UnrelatedScopes { scopes: Vec<String> },

    #[snafu(display("failed to load policy relations"))]
    LoadRelations { source: relation::Error },

    #[snafu(display("failed to store policy relations"))]
    StoreRelations { source: relation::Error },

    #[snafu(display("failed to open state"))]
    OpenState { source: state::Error },

    #[snafu(display("failed to save state"))]
    SaveState { source: state::Error },

    #[snafu(display("failed to create Ranger client"))]
    CreateClient { source: BuildClientError },

    #[snafu(display("failed to handle synchronization trigger"))]
    HandleTrigger { source: handler::Error },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Opts::parse()).await {
        Ok(code) => ExitCode::from(code),
        Err(error) => {
            eprintln!("{}", snafu::Report::from_error(error));
            ExitCode::from(EXIT_ERROR)
        }
    }
}

async fn run(opts: Opts) -> Result<u8, Error> {
    logging::initialize_logging(LOG_ENV, APP_NAME, opts.log_format).context(InitLoggingSnafu)?;

    match opts.command {
        Command::Validate(arguments) => validate(&arguments),
        Command::Sync(arguments) => sync(arguments).await,
    }
}

fn read_configuration(path: &Path) -> Result<UserGroupConfiguration, Error> {
    let raw = fs::read_to_string(path).context(ReadConfigurationSnafu { path })?;
    UserGroupConfiguration::parse(&raw).context(InvalidConfigurationSnafu { path })
}

fn read_relations(path: Option<&Path>) -> Result<Vec<PolicyRelation>, Error> {
    match path {
        Some(path) => relation::read_relations_file(path).context(LoadRelationsSnafu),
        None => Ok(Vec::new()),
    }
}

fn validate(arguments: &ValidateArguments) -> Result<u8, Error> {
    let configuration = read_configuration(&arguments.config)?;

    if let Some(path) = &arguments.relations {
        let relations = relation::read_relations_file(path).context(LoadRelationsSnafu)?;
        let unrelated = configuration.unrelated_scopes(&relation::related_services(&relations));
        ensure!(
            unrelated.is_empty(),
            UnrelatedScopesSnafu {
                scopes: unrelated
                    .into_iter()
                    .map(str::to_owned)
                    .collect::<Vec<_>>()
            }
        );
    }

    for (scope, record) in configuration.scopes() {
        println!(
            "{scope}: {groups} groups, {users} users, {memberships} memberships",
            groups = record.groups.len(),
            users = record.users.len(),
            memberships = record.memberships.len(),
        );
    }
    Ok(EXIT_SUCCESS)
}

async fn sync(arguments: SyncArguments) -> Result<u8, Error> {
    let SyncArguments {
        config,
        state_file,
        relations_file,
        leader,
        workload_active,
        retry,
        ranger,
    } = arguments;

    tracing::info!(
        ranger_url = %ranger.ranger_url,
        charm_function = %ranger.charm_function,
        sync_interval_ms = ranger.sync_interval.map(|interval| interval.as_millis()),
        sync_ldap_url = ranger.sync_ldap_url.as_ref().map(tracing::field::display),
        "starting synchronization"
    );

    let configuration =
        fs::read_to_string(&config).context(ReadConfigurationSnafu { path: &config })?;
    let mut relations = read_relations(relations_file.as_deref())?;
    let mut state = FileStateStore::open(&state_file).context(OpenStateSnafu)?;

    let client = RangerClient::new(
        &ranger.ranger_url,
        Credentials {
            username: ranger.ranger_admin_user,
            password: ranger.ranger_admin_password,
        },
    )
    .context(CreateClientSnafu)?;
    let handler = UserGroupSync::new(
        Reconciler::new(client, retry.policy()),
        ranger.charm_function,
        ranger.external_hostname,
    );

    let trigger = Trigger {
        is_leader: leader,
        workload_active,
        configuration: &configuration,
    };
    let outcome = handler
        .handle(&trigger, &mut state, &mut relations)
        .await
        .context(HandleTriggerSnafu)?;

    state.save().context(SaveStateSnafu)?;
    if let Some(path) = &relations_file {
        relation::write_relations_file(path, &relations).context(StoreRelationsSnafu)?;
    }

    if let Some(status) = outcome.status() {
        println!("{status}");
    }
    Ok(match outcome {
        Outcome::Synchronized(_) | Outcome::Skipped(_) => EXIT_SUCCESS,
        Outcome::Deferred(_) => EXIT_DEFERRED,
        Outcome::Blocked(_) => EXIT_ERROR,
    })
}
