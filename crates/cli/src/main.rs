use clap::{Args, Parser, Subcommand};
use flash_core::config::{resolve_tmp_dir, CoreConfig};
use flash_core::{
    original_key, CropDescriptor, FormFlash, IncomingUpload, SessionId, TmpNamespace, User,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "formflash")]
#[command(about = "Inspect and drive form upload staging areas")]
struct Cli {
    /// Temporary root (defaults to FORMFLASH_TMP_DIR, then ./tmp)
    #[arg(long, global = true)]
    tmp_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct FormArgs {
    /// Session id (32 lowercase hex characters)
    #[arg(long)]
    session: String,
    /// Form instance id within the session
    #[arg(long = "form-id")]
    form_id: String,
    /// Form name
    #[arg(long, default_value = "form")]
    form: String,
}

#[derive(Args)]
struct UploadArgs {
    /// Form field the file belongs to
    #[arg(long)]
    field: String,
    /// Display filename (defaults to the source file name)
    #[arg(long)]
    filename: Option<String>,
    /// MIME type of the upload
    #[arg(long = "type", default_value = "application/octet-stream")]
    mime_type: String,
    /// File to move into the staging area
    source: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a fresh session id
    NewSession,
    /// Stage an upload, replacing any earlier version
    Admit {
        #[command(flatten)]
        form: FormArgs,
        #[command(flatten)]
        upload: UploadArgs,
    },
    /// Stage a cropped rendition of a file
    Crop {
        #[command(flatten)]
        form: FormArgs,
        #[command(flatten)]
        upload: UploadArgs,
        /// Crop transform as key=value pairs, e.g. "x=0,y=0,w=100,h=100"
        #[arg(long)]
        crop: String,
    },
    /// Un-stage a file and its original
    Remove {
        #[command(flatten)]
        form: FormArgs,
        #[arg(long)]
        field: String,
        #[arg(long)]
        filename: String,
    },
    /// Record the user editing the form (omit --username to clear)
    SetUser {
        #[command(flatten)]
        form: FormArgs,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Show staged files and originals
    List {
        #[command(flatten)]
        form: FormArgs,
    },
    /// Show the flattened legacy view with absolute temp paths
    Legacy {
        #[command(flatten)]
        form: FormArgs,
    },
    /// List temp files no record references
    Orphans {
        #[command(flatten)]
        form: FormArgs,
    },
    /// Remove every form staged in a session
    Clear {
        /// Session id (32 lowercase hex characters)
        #[arg(long)]
        session: String,
    },
}

fn open(ns: &TmpNamespace, form: &FormArgs) -> Result<FormFlash, Box<dyn std::error::Error>> {
    let session = SessionId::parse(&form.session)?;
    Ok(FormFlash::new(ns, session, &form.form_id, &form.form)?)
}

fn incoming(upload: &UploadArgs) -> (String, IncomingUpload) {
    let filename = upload.filename.clone().unwrap_or_else(|| {
        upload
            .source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string()
    });
    let incoming = IncomingUpload::new(&upload.source, filename.clone(), &upload.mime_type);
    (filename, incoming)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("flash_core=info".parse()?)
                .add_directive("formflash=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let tmp_dir = match cli.tmp_dir {
        Some(dir) => resolve_tmp_dir(Some(dir.display().to_string()), &std::env::current_dir()?),
        None => resolve_tmp_dir(
            std::env::var("FORMFLASH_TMP_DIR").ok(),
            &std::env::current_dir()?,
        ),
    };
    let cfg = CoreConfig::new(tmp_dir)?;
    let ns = TmpNamespace::new(&cfg);
    tracing::debug!("forms root {}", ns.forms_dir().display());

    match cli.command {
        Some(Commands::NewSession) => {
            println!("{}", SessionId::new());
        }
        Some(Commands::Admit { form, upload }) => {
            let mut flash = open(&ns, &form)?;
            let (filename, incoming) = incoming(&upload);
            flash.admit_upload(&upload.field, &filename, &incoming)?;
            flash.save()?;
            tracing::info!(
                "++ staged {}/{} in {}",
                upload.field,
                filename,
                flash.tmp_dir().display()
            );
            println!("Staged {}/{}", upload.field, filename);
        }
        Some(Commands::Crop { form, upload, crop }) => {
            let crop = CropDescriptor::parse_pairs(&crop)?;
            let mut flash = open(&ns, &form)?;
            let (filename, incoming) = incoming(&upload);
            flash.apply_crop(&upload.field, &filename, &incoming, crop)?;
            flash.save()?;
            tracing::info!(
                "++ cropped {}/{} in {}",
                upload.field,
                filename,
                flash.tmp_dir().display()
            );
            println!("Cropped {}/{}", upload.field, filename);
        }
        Some(Commands::Remove {
            form,
            field,
            filename,
        }) => {
            let mut flash = open(&ns, &form)?;
            if flash.remove_file(&field, &filename) {
                flash.save()?;
                tracing::info!("-- removed {}/{}", field, filename);
                println!("Removed {}/{}", field, filename);
            } else {
                println!("{}/{} is not staged", field, filename);
            }
        }
        Some(Commands::SetUser {
            form,
            username,
            email,
        }) => {
            let mut flash = open(&ns, &form)?;
            let user = username.map(|username| User::new(username, email));
            flash.set_user(user.as_ref());
            flash.save()?;
            match flash.user() {
                Some(user) => println!("User set to {}", user.username),
                None => println!("User cleared"),
            }
        }
        Some(Commands::List { form }) => {
            let flash = open(&ns, &form)?;
            let ledger = flash.ledger();
            if ledger.is_empty() {
                println!("No files staged.");
            }
            for field in ledger.fields() {
                for (filename, record) in ledger.field(field).into_iter().flatten() {
                    let tmp = record.tmp_name.as_ref().map_or("-", |b| b.as_str());
                    println!("{}/{}: {} [{}]", field, filename, tmp, record.mime_type);
                    if let Some(original) = ledger.original(field, filename) {
                        let tmp = original.tmp_name.as_ref().map_or("-", |b| b.as_str());
                        println!("  {}/{}: {}", original_key(field), filename, tmp);
                    }
                }
            }
        }
        Some(Commands::Legacy { form }) => {
            let flash = open(&ns, &form)?;
            print!("{}", serde_yaml::to_string(&flash.legacy_view())?);
        }
        Some(Commands::Orphans { form }) => {
            let flash = open(&ns, &form)?;
            let orphans = flash.orphans()?;
            if orphans.is_empty() {
                println!("No orphaned files.");
            }
            for name in orphans {
                println!("{}", name);
            }
        }
        Some(Commands::Clear { session }) => {
            let session = SessionId::parse(&session)?;
            FormFlash::clear_session(&ns, &session)?;
            println!("Cleared session {}", session);
        }
        None => {
            println!("Use 'formflash --help' for commands");
        }
    }

    Ok(())
}
