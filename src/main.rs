use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod analysis;
mod graph;
mod index;
mod models;
mod ranking;
mod recommend;
mod report;
mod risk;
mod scoring;
mod store;

use analysis::{run_pass, AnalysisOptions};
use models::{RecommendationPayload, RiskLevel, Urgency};
use recommend::Curriculum;

#[derive(Parser)]
#[command(name = "engagement-analytics")]
#[command(about = "Student engagement scoring, risk, and peer recommendations", long_about = None)]
struct Cli {
    /// Activity snapshot (.csv of activity rows or .json bundle)
    #[arg(long, global = true, default_value = "snapshot.csv")]
    snapshot: PathBuf,
    /// Optional roster sidecar CSV (id, name, cohort)
    #[arg(long, global = true)]
    students: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the engagement leaderboard
    #[command(group(
        ArgGroup::new("scope")
            .args(["cohort", "student"])
            .multiple(false)
    ))]
    Score {
        #[arg(long)]
        cohort: Option<String>,
        #[arg(long)]
        student: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Print students descending by risk score
    #[command(group(
        ArgGroup::new("scope")
            .args(["cohort", "student"])
            .multiple(false)
    ))]
    Risk {
        #[arg(long)]
        cohort: Option<String>,
        #[arg(long)]
        student: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Print peer-based recommendations for one student
    Recommend {
        #[arg(long)]
        student: String,
        #[arg(long, default_value_t = 3)]
        top: usize,
        /// Curriculum JSON with target topics and prerequisites
        #[arg(long)]
        curriculum: Option<PathBuf>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        cohort: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Serialize the full analysis bundle as JSON
    Export {
        #[arg(long, default_value = "bundle.json")]
        out: PathBuf,
        /// Curriculum JSON with target topics and prerequisites
        #[arg(long)]
        curriculum: Option<PathBuf>,
    },
}

fn load_curriculum(path: Option<&PathBuf>) -> anyhow::Result<Option<Curriculum>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read curriculum {}", path.display()))?;
    let curriculum = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse curriculum {}", path.display()))?;
    Ok(Some(curriculum))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let snapshot = store::load_snapshot(&cli.snapshot, cli.students.as_deref())?;

    match cli.command {
        Commands::Score {
            cohort,
            student,
            limit,
        } => {
            let scoped = snapshot.scoped(cohort.as_deref(), student.as_deref());
            let bundle = run_pass(&scoped, &AnalysisOptions::default());

            if bundle.rankings.is_empty() {
                println!("No students found for this scope.");
                return Ok(());
            }
            println!("Engagement leaderboard:");
            for entry in bundle.rankings.iter().take(limit) {
                println!(
                    "{}. {} ({}) score {:.2}, consistency {:.0}, {} activities (p{:.0})",
                    entry.rank,
                    entry.name,
                    entry.student_id,
                    entry.total_score,
                    entry.consistency_score,
                    entry.activity_count,
                    entry.percentile
                );
            }
        }
        Commands::Risk {
            cohort,
            student,
            limit,
        } => {
            let scoped = snapshot.scoped(cohort.as_deref(), student.as_deref());
            let bundle = run_pass(&scoped, &AnalysisOptions::default());

            if bundle.risk_assessments.is_empty() {
                println!("No students found for this scope.");
                return Ok(());
            }
            println!("Students by risk score:");
            for assessment in bundle.risk_assessments.iter().take(limit) {
                let urgency = match assessment.urgency {
                    Urgency::Immediate => " [immediate]",
                    Urgency::Scheduled => "",
                };
                println!(
                    "- {} ({}) risk {:.0}, level {}, trend {}{}",
                    assessment.name,
                    assessment.student_id,
                    assessment.risk_score,
                    assessment.risk_level,
                    assessment.trend,
                    urgency
                );
                if assessment.risk_level == RiskLevel::High {
                    for intervention in &assessment.recommended_interventions {
                        println!("    {intervention}");
                    }
                }
            }
        }
        Commands::Recommend {
            student,
            top,
            curriculum,
        } => {
            let options = AnalysisOptions {
                top_recommendations: top,
                curriculum: load_curriculum(curriculum.as_ref())?,
                as_of: None,
            };
            let bundle = run_pass(&snapshot, &options);
            let own: Vec<_> = bundle
                .recommendations
                .iter()
                .filter(|rec| rec.student_id == student)
                .collect();

            if own.is_empty() {
                println!("No recommendations for {student} (no peer links in this snapshot).");
                return Ok(());
            }
            println!("Recommendations for {student}:");
            for rec in own {
                match &rec.payload {
                    RecommendationPayload::Activity { category } => {
                        println!("- Try {category} (confidence {:.2})", rec.confidence);
                    }
                    RecommendationPayload::StudyGroup { members } => {
                        println!(
                            "- Study group with {} (confidence {:.2})",
                            members[1..].join(", "),
                            rec.confidence
                        );
                    }
                    RecommendationPayload::LearningPath { topics } => {
                        println!("- Learning path: {}", topics.join(" -> "));
                    }
                }
            }
        }
        Commands::Report { cohort, out } => {
            let scoped = snapshot.scoped(cohort.as_deref(), None);
            let bundle = run_pass(&scoped, &AnalysisOptions::default());
            let report = report::build_report(cohort.as_deref(), &bundle);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { out, curriculum } => {
            let options = AnalysisOptions {
                curriculum: load_curriculum(curriculum.as_ref())?,
                ..AnalysisOptions::default()
            };
            let bundle = run_pass(&snapshot, &options);
            let raw = serde_json::to_string_pretty(&bundle)?;
            std::fs::write(&out, raw)?;
            println!("Bundle written to {}.", out.display());
        }
    }

    Ok(())
}
