//! Roll call command-line client.
//!
//! Usage:
//!   rollcall login                         - Log in and print the access token
//!   rollcall whoami                        - Show the authenticated user
//!   rollcall lessons                       - List today's lessons
//!   rollcall history [--lesson] [--date]   - Browse attendance history
//!   rollcall faults [--lesson]             - Show absence statistics
//!   rollcall pendences                     - Lessons still waiting for a roll call
//!   rollcall call --photo <path>           - Take the roll call from a class photo
//!   rollcall collections list|delete <id>  - Manage face collections

use anyhow::{bail, Context, Result};
use attendance::{
    auth::AuthClient,
    capture::FileImageSource,
    clock::SystemClock,
    config::{CropMode, RollCallConfig},
    crop::{FaceCropper, LocalFaceCropper, ResizeServiceClient},
    faces::{FaceCollectionStore, RekognitionStore},
    http::BackendHttp,
    matching::MatchSettings,
    school::{HttpSchoolClient, SchoolBackend},
    session::{MemorySessionStore, SessionStore},
    AttendancePipeline, Notice,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use common::{
    faults::select_faults,
    history::{filter_history, initials, lessons_in_history},
    users::User,
};
use std::{path::PathBuf, sync::Arc};
use tracing::info;

#[derive(Parser)]
#[command(name = "rollcall")]
#[command(about = "Classroom attendance by face recognition", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Account email
    #[arg(long, env = "ROLLCALL_EMAIL", global = true)]
    email: Option<String>,

    /// Account password
    #[arg(long, env = "ROLLCALL_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,

    /// Access token from a previous login
    #[arg(long, env = "ROLLCALL_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and print the access token
    Login,

    /// Show the authenticated user
    Whoami,

    /// List today's lessons
    Lessons,

    /// Browse attendance history
    History {
        /// Lesson abbreviation
        #[arg(long)]
        lesson: Option<String>,

        /// Call date (YYYY-MM-DD), requires --lesson
        #[arg(long, requires = "lesson")]
        date: Option<NaiveDate>,
    },

    /// Show absence statistics
    Faults {
        /// Lesson abbreviation
        #[arg(long)]
        lesson: Option<String>,
    },

    /// Lessons of the day still waiting for a roll call
    Pendences,

    /// Take the roll call of the lesson in session from a class photo
    Call {
        /// Photo of the class
        #[arg(long)]
        photo: PathBuf,

        /// Print pipeline metrics when done
        #[arg(long)]
        print_metrics: bool,
    },

    /// Manage face collections
    Collections {
        #[command(subcommand)]
        command: CollectionCommands,
    },
}

#[derive(Subcommand)]
enum CollectionCommands {
    /// List all collections
    List,

    /// Delete a collection
    Delete {
        /// Collection id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = telemetry::init_structured_logging(
        telemetry::LogConfig::new("rollcall").with_version(env!("CARGO_PKG_VERSION")),
    );

    let cli = Cli::parse();
    let config = RollCallConfig::from_env()?;

    let session: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    let backend = Arc::new(BackendHttp::new(
        config.api_url.clone(),
        config.api_timeout,
        session.clone(),
    )?);
    let auth = AuthClient::new(backend.clone());
    let school = HttpSchoolClient::new(backend.clone());

    match cli.command {
        Commands::Collections { command } => {
            let faces = RekognitionStore::connect(&config.rekognition).await;
            collections(&faces, command).await
        }
        Commands::Login => {
            login(&auth, &cli.email, &cli.password).await?;
            let token = session.token().await.context("login returned no token")?;
            println!("{}", token);
            Ok(())
        }
        command => {
            authenticate(&auth, &session, &cli.email, &cli.password, &cli.token).await?;
            let user = school.current_user().await?;
            run(command, &config, &user, &school, backend).await
        }
    }
}

async fn login(auth: &AuthClient, email: &Option<String>, password: &Option<String>) -> Result<()> {
    let (Some(email), Some(password)) = (email, password) else {
        bail!("ROLLCALL_EMAIL and ROLLCALL_PASSWORD are required to log in");
    };
    auth.login(email, password).await
}

async fn authenticate(
    auth: &AuthClient,
    session: &Arc<dyn SessionStore>,
    email: &Option<String>,
    password: &Option<String>,
    token: &Option<String>,
) -> Result<()> {
    if let Some(token) = token {
        session.set_token(token.clone()).await;
        if auth.check_token().await? {
            return Ok(());
        }
        info!("stored token rejected, logging in again");
        session.clear().await;
    }
    login(auth, email, password).await
}

async fn run(
    command: Commands,
    config: &RollCallConfig,
    user: &User,
    school: &HttpSchoolClient,
    backend: Arc<BackendHttp>,
) -> Result<()> {
    match command {
        Commands::Whoami => {
            println!("{}", serde_json::to_string_pretty(user)?);
        }
        Commands::Lessons => {
            let lessons = school.daily_lessons(user.ra).await?;
            for lesson in &lessons {
                println!(
                    "{}  {}  {} {}  room {}",
                    lesson.time, lesson.lesson_abr, lesson.curse_abr, lesson.semester, lesson.room
                );
            }
        }
        Commands::History { lesson, date } => {
            let history = school.history(user.ra).await?;
            match (lesson, date) {
                (Some(lesson), Some(date)) => {
                    for entry in filter_history(&history, &lesson, date) {
                        let presence = if entry.have_presence { "present" } else { "absent" };
                        println!(
                            "{:<4} {:<10} {:<30} {}",
                            initials(&entry.user_name),
                            entry.ra,
                            entry.user_name,
                            presence
                        );
                    }
                }
                (Some(lesson), None) => {
                    let entries = history.iter().filter(|e| e.lesson_abr == lesson);
                    for entry in entries {
                        println!("{}  {}  {}", entry.call_date, entry.ra, entry.user_name);
                    }
                }
                _ => {
                    for lesson in lessons_in_history(&history) {
                        println!("{}", lesson);
                    }
                }
            }
        }
        Commands::Faults { lesson } => {
            let faults = school.faults(user.ra).await?;
            let selected: Vec<_> = match &lesson {
                Some(lesson) => select_faults(&faults, lesson).into_iter().collect(),
                None => faults.iter().collect(),
            };
            if selected.is_empty() {
                bail!("no absence statistics found");
            }
            for stats in selected {
                println!(
                    "{}  presence {:.1}%  absences {}/{}  remaining {}",
                    stats.lesson_abr,
                    stats.presence_percent(),
                    stats.total_falts,
                    stats.max_falts,
                    stats.remaining_faults()
                );
            }
        }
        Commands::Pendences => {
            let lessons = school.daily_lessons(user.ra).await?;
            let pendences = school.check_pendences(user.ra, &lessons).await?;
            println!("{}", serde_json::to_string_pretty(&pendences)?);
        }
        Commands::Call {
            photo,
            print_metrics,
        } => {
            if !user.is_professor() {
                bail!("only professors can take the roll call");
            }
            let lessons = school.daily_lessons(user.ra).await?;
            call(config, user, &photo, lessons, backend).await?;
            if print_metrics {
                print!("{}", telemetry::metrics::render()?);
            }
        }
        Commands::Login | Commands::Collections { .. } => {}
    }
    Ok(())
}

async fn call(
    config: &RollCallConfig,
    user: &User,
    photo: &std::path::Path,
    lessons: Vec<common::lessons::DailyLesson>,
    backend: Arc<BackendHttp>,
) -> Result<()> {
    let faces: Arc<dyn FaceCollectionStore> =
        Arc::new(RekognitionStore::connect(&config.rekognition).await);

    let cropper: Arc<dyn FaceCropper> = match config.crop_mode {
        CropMode::Local => Arc::new(LocalFaceCropper::default()),
        CropMode::Remote => {
            let resize = BackendHttp::new(
                config.resize_url.clone(),
                config.api_timeout,
                backend.session().clone(),
            )?;
            Arc::new(ResizeServiceClient::new(Arc::new(resize)))
        }
    };

    let school: Arc<dyn SchoolBackend> = Arc::new(HttpSchoolClient::new(backend));
    let camera = Arc::new(FileImageSource::new(photo, &config.capture_dir));
    let matching = MatchSettings::new(config.enrollment_collection.clone())
        .with_threshold(config.match_threshold);

    let pipeline = AttendancePipeline::new(
        camera,
        faces,
        cropper,
        school,
        Arc::new(SystemClock),
        matching,
    );

    match pipeline.run(user.ra, &lessons).await {
        Ok(outcome) => {
            println!("{}", Notice::from_outcome(&outcome));
            for warning in &outcome.warnings {
                println!("warning: {}", warning);
            }
            Ok(())
        }
        Err(e) => {
            let notice = Notice::from_error(&e);
            println!("{}", notice);
            Err(e.into())
        }
    }
}

async fn collections(faces: &dyn FaceCollectionStore, command: CollectionCommands) -> Result<()> {
    match command {
        CollectionCommands::List => {
            for id in faces.list_collections().await? {
                println!("{}", id);
            }
        }
        CollectionCommands::Delete { id } => {
            faces.delete_collection(&id).await?;
            info!(collection = %id, "collection deleted");
        }
    }
    Ok(())
}
