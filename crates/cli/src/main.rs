//! StudyTrack CLI - course progress tracking.

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use studytrack_core::{resolve, MetricValue, TrackableRef, UserId};
use studytrack_progress::ProgressEngine;
use studytrack_storage::{JsonStorage, Storage};
use tracing::Level;

#[derive(Parser)]
#[command(name = "studytrack")]
#[command(about = "Course progress tracking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage courses
    Course {
        #[command(subcommand)]
        command: CourseCommands,
    },
    /// Manage chapters
    Chapter {
        #[command(subcommand)]
        command: ChapterCommands,
    },
    /// Manage metrics
    Metric {
        #[command(subcommand)]
        command: MetricCommands,
    },
    /// Record a progress value for a course or chapter
    Record {
        /// Course metric ID
        metric: String,
        /// New value (absent values read as zero)
        value: Decimal,
        /// Record against a chapter instead of the whole course
        #[arg(long)]
        chapter: Option<String>,
    },
    /// Record an achievement value on a progress instance
    Achieve {
        /// Progress instance ID
        progress: String,
        /// Achievement metric ID
        level: String,
        /// New value
        value: Decimal,
    },
    /// Show the typed total of a course metric
    Total {
        /// Course metric ID
        metric: String,
    },
    /// Recompute cached totals from their rows and repair drift
    Audit {
        /// Course metric ID
        metric: String,
    },
    /// Manage study sessions
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
}

#[derive(Subcommand)]
enum CourseCommands {
    /// Add a course
    Add {
        /// Course title
        title: String,
        /// Owning user
        #[arg(long)]
        owner: String,
    },
    /// List courses
    List,
    /// Mark a course completed
    Complete {
        /// Course ID
        id: String,
    },
    /// Delete a course and everything it owns
    Rm {
        /// Course ID
        id: String,
    },
}

#[derive(Subcommand)]
enum ChapterCommands {
    /// Add a chapter
    Add {
        /// Course ID
        course: String,
        /// Chapter title
        title: String,
        /// Parent chapter ID for a subchapter
        #[arg(long)]
        parent: Option<String>,
        /// 1-based position; appends when omitted
        #[arg(long)]
        position: Option<u32>,
    },
    /// Move a chapter among its siblings
    Move {
        /// Chapter ID
        id: String,
        /// New 1-based position
        position: u32,
    },
    /// Delete a chapter and its subtree
    Rm {
        /// Chapter ID
        id: String,
    },
    /// List the chapters of a course
    List {
        /// Course ID
        course: String,
    },
}

#[derive(Subcommand)]
enum MetricCommands {
    /// Define a metric for a course
    Define {
        /// Course ID
        course: String,
        /// Metric name
        name: String,
        /// Metric kind: number, time, boolean, percentage
        kind: String,
    },
    /// Register a course metric aggregate for a definition
    Register {
        /// Course ID
        course: String,
        /// Metric definition ID
        metric: String,
    },
    /// Add an achievement level under a course metric
    Level {
        /// Course metric ID
        metric: String,
        /// Achievement level name
        name: String,
        /// Weight (0-100)
        #[arg(long, default_value = "100")]
        weight: u8,
        /// Estimated time in minutes
        #[arg(long)]
        estimate_mins: Option<u64>,
    },
    /// List the metrics of a course
    List {
        /// Course ID
        course: String,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Open a study session
    Start {
        /// Session holder
        user: String,
    },
    /// Close a study session
    Close {
        /// Session ID
        id: String,
        /// Net study time in minutes
        #[arg(long)]
        spent_mins: Option<u64>,
    },
    /// Apply a signed achievement delta inside a session
    Log {
        /// Session ID
        session: String,
        /// Progress instance ID
        progress: String,
        /// Achievement metric ID
        level: String,
        /// Signed delta
        delta: Decimal,
    },
    /// Show the changes journalled in a session
    Show {
        /// Session ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::WARN)
        .init();

    let cli = Cli::parse();

    // Open storage
    let storage_path = std::path::PathBuf::from(".studytrack");
    let storage = JsonStorage::new(&storage_path).await?;

    match cli.command {
        Commands::Course { command } => course_command(storage, command).await?,
        Commands::Chapter { command } => chapter_command(storage, command).await?,
        Commands::Metric { command } => metric_command(storage, command).await?,
        Commands::Record {
            metric,
            value,
            chapter,
        } => {
            let metric_id = parse_id(&metric, "course metric")?;
            let target = match chapter {
                Some(chapter) => TrackableRef::Chapter(parse_id(&chapter, "chapter")?),
                None => {
                    let metric = storage
                        .load_course_metric(metric_id)
                        .await?
                        .ok_or_else(|| anyhow::anyhow!("Course metric not found"))?;
                    TrackableRef::Course(metric.course_id)
                }
            };
            let engine = ProgressEngine::new(storage);
            let instance = engine
                .upsert_progress_value(target, metric_id, Some(value))
                .await?;
            println!("Recorded {} = {} ({})", target, instance.value, instance.id);
        }
        Commands::Achieve {
            progress,
            level,
            value,
        } => {
            let engine = ProgressEngine::new(storage);
            let record = engine
                .upsert_achievement_value(
                    parse_id(&progress, "progress instance")?,
                    parse_id(&level, "achievement metric")?,
                    Some(value),
                )
                .await?;
            println!("Recorded achievement {} = {}", record.id, record.value);
        }
        Commands::Total { metric } => {
            let engine = ProgressEngine::new(storage);
            let total = engine.typed_total(parse_id(&metric, "course metric")?).await?;
            println!("{}", format_value(&total));
        }
        Commands::Audit { metric } => {
            let metric_id = parse_id(&metric, "course metric")?;
            let levels = storage.list_achievement_metrics(metric_id).await?;
            let engine = ProgressEngine::new(storage);

            let total = engine.recompute_course_metric_total(metric_id).await?;
            println!("Course metric {}: {}", metric_id, total);
            for level in levels {
                let total = engine.recompute_achievement_metric_total(level.id).await?;
                println!("  {} ({}): {}", level.achievement_level, level.id, total);
            }
        }
        Commands::Session { command } => session_command(storage, command).await?,
    }

    Ok(())
}

async fn course_command(storage: JsonStorage, command: CourseCommands) -> Result<()> {
    match command {
        CourseCommands::Add { title, owner } => {
            let engine = ProgressEngine::new(storage);
            let course = engine.create_course(UserId::new(owner), title).await?;
            println!("Added course: {} - {}", course.id, course.title);
        }
        CourseCommands::List => {
            let courses = storage.list_courses().await?;
            println!("Courses ({})", courses.len());
            for course in courses {
                let done = if course.date_completed.is_some() {
                    " [completed]"
                } else {
                    ""
                };
                println!("  {} | {} | {}{}", course.id, course.owner, course.title, done);
            }
        }
        CourseCommands::Complete { id } => {
            let engine = ProgressEngine::new(storage);
            let course = engine.complete_course(parse_id(&id, "course")?).await?;
            println!(
                "Completed course: {} at {}",
                course.title,
                course.date_completed.unwrap_or(course.date_modified)
            );
        }
        CourseCommands::Rm { id } => {
            let engine = ProgressEngine::new(storage);
            engine.delete_course(parse_id(&id, "course")?).await?;
            println!("Deleted course {}", id);
        }
    }
    Ok(())
}

async fn chapter_command(storage: JsonStorage, command: ChapterCommands) -> Result<()> {
    match command {
        ChapterCommands::Add {
            course,
            title,
            parent,
            position,
        } => {
            let parent = parent.map(|p| parse_id(&p, "chapter")).transpose()?;
            let engine = ProgressEngine::new(storage);
            let chapter = engine
                .insert_chapter(parse_id(&course, "course")?, parent, title, position)
                .await?;
            println!(
                "Added chapter {} at position {}: {}",
                chapter.id, chapter.order, chapter.title
            );
        }
        ChapterCommands::Move { id, position } => {
            let engine = ProgressEngine::new(storage);
            engine
                .move_chapter(parse_id(&id, "chapter")?, position)
                .await?;
            println!("Moved chapter {} to position {}", id, position);
        }
        ChapterCommands::Rm { id } => {
            let engine = ProgressEngine::new(storage);
            engine.delete_chapter(parse_id(&id, "chapter")?).await?;
            println!("Deleted chapter {}", id);
        }
        ChapterCommands::List { course } => {
            let mut chapters = storage.list_chapters(parse_id(&course, "course")?).await?;
            chapters.sort_by_key(|c| c.order);
            println!("Chapters ({})", chapters.len());
            for chapter in chapters.iter().filter(|c| c.parent.is_none()) {
                println!("  {}. {} ({})", chapter.order, chapter.title, chapter.id);
                for sub in chapters.iter().filter(|c| c.parent == Some(chapter.id)) {
                    println!(
                        "    {}.{} {} ({})",
                        chapter.order, sub.order, sub.title, sub.id
                    );
                }
            }
        }
    }
    Ok(())
}

async fn metric_command(storage: JsonStorage, command: MetricCommands) -> Result<()> {
    match command {
        MetricCommands::Define { course, name, kind } => {
            let kind = resolve(&kind)
                .kind()
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            let engine = ProgressEngine::new(storage);
            let definition = engine
                .create_metric_definition(parse_id(&course, "course")?, name, kind)
                .await?;
            println!(
                "Defined metric {} ({}): {}",
                definition.name, definition.kind, definition.id
            );
        }
        MetricCommands::Register { course, metric } => {
            let engine = ProgressEngine::new(storage);
            let registered = engine
                .register_course_metric(
                    parse_id(&course, "course")?,
                    parse_id(&metric, "metric definition")?,
                )
                .await?;
            println!("Registered course metric {}", registered.id);
        }
        MetricCommands::Level {
            metric,
            name,
            weight,
            estimate_mins,
        } => {
            let estimate = estimate_mins.map(|m| std::time::Duration::from_secs(m * 60));
            let engine = ProgressEngine::new(storage);
            let level = engine
                .add_achievement_metric(
                    parse_id(&metric, "course metric")?,
                    name,
                    weight,
                    estimate,
                )
                .await?;
            println!(
                "Added achievement level {} (weight {}): {}",
                level.achievement_level, level.weight, level.id
            );
        }
        MetricCommands::List { course } => {
            let course_id = parse_id(&course, "course")?;
            let definitions = storage.list_metric_definitions(course_id).await?;
            let registered = storage.list_course_metrics(course_id).await?;

            println!("Metrics ({})", definitions.len());
            for definition in definitions {
                match registered.iter().find(|m| m.metric_id == definition.id) {
                    Some(metric) => println!(
                        "  {} ({}) | total {} | {}",
                        definition.name, definition.kind, metric.total, metric.id
                    ),
                    None => println!(
                        "  {} ({}) | unregistered | {}",
                        definition.name, definition.kind, definition.id
                    ),
                }
            }
        }
    }
    Ok(())
}

async fn session_command(storage: JsonStorage, command: SessionCommands) -> Result<()> {
    match command {
        SessionCommands::Start { user } => {
            let engine = ProgressEngine::new(storage);
            let session = engine.start_session(UserId::new(user)).await?;
            println!("Started session {} at {}", session.id, session.start_time);
        }
        SessionCommands::Close { id, spent_mins } => {
            let engine = ProgressEngine::new(storage);
            let spent = spent_mins.map(|m| std::time::Duration::from_secs(m * 60));
            let session = engine
                .close_session(parse_id(&id, "session")?, chrono::Utc::now(), spent)
                .await?;
            println!("Closed session {}", session.id);
        }
        SessionCommands::Log {
            session,
            progress,
            level,
            delta,
        } => {
            let engine = ProgressEngine::new(storage);
            let change = engine
                .apply_achievement_change(
                    parse_id(&session, "session")?,
                    parse_id(&progress, "progress instance")?,
                    parse_id(&level, "achievement metric")?,
                    delta,
                )
                .await?;
            println!("Logged change {} ({})", change.id, change.value);
        }
        SessionCommands::Show { id } => {
            let engine = ProgressEngine::new(storage);
            let changes = engine.session_changes(parse_id(&id, "session")?).await?;
            println!("Changes ({})", changes.len());
            for change in changes {
                println!(
                    "  {} | {} | {} on {}",
                    change.recorded_at, change.id, change.value, change.achievement_id
                );
            }
        }
    }
    Ok(())
}

fn parse_id<T: std::str::FromStr>(s: &str, what: &str) -> Result<T> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("Invalid {} ID: {}", what, s))
}

fn format_value(value: &MetricValue) -> String {
    match value {
        MetricValue::Number(n) => n.to_string(),
        MetricValue::Time(d) => {
            let secs = d.as_secs();
            format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
        MetricValue::Boolean(b) => b.to_string(),
        MetricValue::Percentage(p) => format!("{}%", p),
    }
}
