//! Atrium admin command line.
//!
//! Runs theme and user administration against the configured database.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use atrium_kernel::config::Config;
use atrium_kernel::models::UserLookupKey;
use atrium_kernel::theme::ThemeScaffold;
use atrium_kernel::users::{MailFormat, MailRecipient, MailRequest, UserCriteria, import};
use atrium_kernel::{ActingUser, AdminContext, AdminState, MessageKind};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Act as this user.
    #[arg(long = "as", global = true)]
    acting_as: Option<String>,

    /// Run as the installer (theme regeneration without permissions).
    #[arg(long, global = true)]
    installing: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Theme registry administration.
    #[command(subcommand)]
    Theme(ThemeCommand),

    /// User account administration.
    #[command(subcommand)]
    User(UserCommand),
}

#[derive(Subcommand, Debug)]
enum ThemeCommand {
    /// Reconcile the registry with the themes directory.
    Regenerate,

    /// List registered themes.
    List,

    /// Make a theme the site default.
    SetDefault {
        name: String,
        /// Also clear every user's own theme selection.
        #[arg(long)]
        reset_users: bool,
    },

    /// Unregister a theme.
    Delete {
        name: String,
        /// Also remove the theme directory.
        #[arg(long)]
        delete_files: bool,
    },

    /// Create the files of a new theme.
    Create {
        name: String,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        contact: Option<String>,
    },

    /// Manage a theme's running configuration.
    RunningConfig {
        #[command(subcommand)]
        action: RunningConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum RunningConfigAction {
    /// Copy the theme settings into the running configuration.
    Create { name: String },
    /// Delete the running configuration.
    Delete { name: String },
    /// Delete one file of the running configuration.
    DeleteFile { name: String, file: String },
    /// Remove a page configuration assignment.
    Unassign { name: String, page_configuration: String },
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Search user accounts.
    Find(FindArgs),

    /// Check which names or e-mail addresses are taken.
    Exists {
        /// Match e-mail addresses instead of user names.
        #[arg(long)]
        mail: bool,
        values: Vec<String>,
    },

    /// Delete accounts.
    Delete {
        ids: Vec<Uuid>,
        /// Only mark the accounts for deletion.
        #[arg(long)]
        mark_only: bool,
    },

    /// E-mail selected users.
    Mail(MailArgs),

    /// Import users from a CSV file.
    Import { file: PathBuf },

    /// Show the admin menu for the acting user.
    Links,
}

#[derive(Args, Debug)]
struct FindArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    mail: Option<String>,
    #[arg(long)]
    group: Option<Uuid>,
    #[arg(long)]
    registered_after: Option<DateTime<Utc>>,
    #[arg(long)]
    registered_before: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
struct MailArgs {
    /// Recipient user IDs.
    #[arg(required = true)]
    ids: Vec<Uuid>,
    /// Sender name.
    #[arg(long)]
    from: String,
    /// Sender and reply-to address.
    #[arg(long)]
    reply_to: String,
    #[arg(long)]
    subject: String,
    #[arg(long)]
    message: String,
    #[arg(long, conflicts_with = "text")]
    html: bool,
    #[arg(long)]
    text: bool,
    /// Recipients per message; 0 sends a single message.
    #[arg(long)]
    batch_size: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;

    let state = AdminState::new(&config)
        .await
        .context("failed to initialize admin state")?;

    let ctx = context_for(&state, &cli).await?;
    let result = run(&state, &ctx, cli.command).await;

    for message in ctx.messages().drain() {
        let label = match message.kind {
            MessageKind::Status => "status",
            MessageKind::Warning => "warning",
            MessageKind::Error => "error",
        };
        eprintln!("[{label}] {}", message.text);
    }

    result
}

async fn context_for(state: &AdminState, cli: &Cli) -> Result<AdminContext> {
    if cli.installing {
        info!("running as installer");
        return Ok(AdminContext::installer());
    }

    let Some(ref name) = cli.acting_as else {
        return Ok(AdminContext::anonymous());
    };

    let user = state
        .user_store()
        .find_by_name(name)
        .await?
        .with_context(|| format!("no user named '{name}'"))?;
    Ok(AdminContext::new(ActingUser::from(&user)))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(state: &AdminState, ctx: &AdminContext, command: Command) -> Result<()> {
    match command {
        Command::Theme(cmd) => run_theme(state, ctx, cmd).await,
        Command::User(cmd) => run_user(state, ctx, cmd).await,
    }
}

async fn run_theme(state: &AdminState, ctx: &AdminContext, cmd: ThemeCommand) -> Result<()> {
    let admin = state.theme_admin();

    match cmd {
        ThemeCommand::Regenerate => {
            let report = state.theme_reconciler().regenerate(ctx).await?;
            print_json(&report)
        }
        ThemeCommand::List => print_json(&admin.list(ctx).await?),
        ThemeCommand::SetDefault { name, reset_users } => {
            admin.set_as_default(ctx, &name, reset_users).await?;
            Ok(())
        }
        ThemeCommand::Delete { name, delete_files } => {
            admin.delete(ctx, &name, delete_files).await?;
            Ok(())
        }
        ThemeCommand::Create {
            name,
            display_name,
            description,
            contact,
        } => {
            let scaffold = ThemeScaffold {
                name,
                display_name,
                description,
                contact,
                ..Default::default()
            };
            let path = admin.create(ctx, &scaffold).await?;
            println!("{}", path.display());
            Ok(())
        }
        ThemeCommand::RunningConfig { action } => match action {
            RunningConfigAction::Create { name } => {
                print_json(&admin.create_running_config(ctx, &name).await?)
            }
            RunningConfigAction::Delete { name } => {
                print_json(&admin.delete_running_config(ctx, &name).await?)
            }
            RunningConfigAction::DeleteFile { name, file } => {
                print_json(&admin.delete_ini_file(ctx, &name, &file).await?)
            }
            RunningConfigAction::Unassign {
                name,
                page_configuration,
            } => {
                admin
                    .delete_page_configuration_assignment(ctx, &name, &page_configuration)
                    .await?;
                Ok(())
            }
        },
    }
}

async fn run_user(state: &AdminState, ctx: &AdminContext, cmd: UserCommand) -> Result<()> {
    let admin = state.user_admin();

    match cmd {
        UserCommand::Find(args) => {
            let criteria = UserCriteria {
                name: args.name,
                mail: args.mail,
                group: args.group,
                registered_after: args.registered_after,
                registered_before: args.registered_before,
                ..Default::default()
            };
            print_json(&admin.find_users(ctx, &criteria).await?)
        }
        UserCommand::Exists { mail, values } => {
            let key = if mail {
                UserLookupKey::Mail
            } else {
                UserLookupKey::Name
            };
            print_json(&admin.check_multiple_existence(ctx, key, &values).await?)
        }
        UserCommand::Delete { ids, mark_only } => {
            print_json(&admin.delete_users(ctx, &ids, mark_only).await?)
        }
        UserCommand::Mail(args) => {
            let mut recipients = Vec::with_capacity(args.ids.len());
            for id in &args.ids {
                if let Some(user) = state.user_store().find(*id).await? {
                    recipients.push(MailRecipient {
                        id: user.id,
                        name: user.name,
                        address: user.mail,
                    });
                }
            }

            let format = if args.html {
                MailFormat::Html
            } else if args.text {
                MailFormat::Text
            } else {
                MailFormat::Default
            };

            let request = MailRequest {
                recipient_ids: args.ids,
                recipients,
                from: args.from,
                reply_to: args.reply_to,
                subject: args.subject,
                message: args.message,
                format,
                batch_size: args.batch_size,
            };
            let sent = admin.send_mail(ctx, &request).await?;
            println!("{sent}");
            Ok(())
        }
        UserCommand::Import { file } => {
            let input = std::fs::File::open(&file)
                .with_context(|| format!("failed to open {}", file.display()))?;
            let rows = import::read_csv(input)?;
            print_json(&admin.create_import(ctx, &rows).await?)
        }
        UserCommand::Links => print_json(&admin.links(ctx).await?),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
