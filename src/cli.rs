// src/cli.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::api_client::{ApiClient, SearchParams};
use crate::core::cache::CacheRepository;
use crate::core::classifier::StatusClassifier;
use crate::core::database::{Database, ProfileRepository};
use crate::core::history::HistoryRepository;
use crate::core::reference::ReferenceData;
use crate::core::sync::{SyncEngine, SyncOutcome};
use crate::web::run_authorization_flow;

#[derive(Parser)]
#[command(name = "jobhunt")]
#[command(about = "Job-search assistant for the hh.ru recruiting platform")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Authorize a new profile through the browser flow
    Login {
        /// Local name for the profile
        #[arg(long, default_value = "default")]
        profile: String,
    },
    /// List stored profiles
    Profiles,
    /// Switch the active profile
    Use { name: String },
    /// Delete a stored profile
    Delete { name: String },
    /// List resumes of the active profile
    Resumes,
    /// Search vacancies, or list suggestions for a resume
    Search {
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        area: Option<String>,
        /// Professional role id; may be repeated
        #[arg(long = "role")]
        roles: Vec<String>,
        /// Restrict to vacancies published within the last N days
        #[arg(long)]
        period: Option<u32>,
        #[arg(long)]
        work_format: Option<String>,
        /// Use the platform's suggestions for this resume instead of
        /// the filter set
        #[arg(long, conflicts_with_all = ["text", "area", "roles", "period", "work_format"])]
        similar_to: Option<String>,
        #[arg(long, default_value_t = 0)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        per_page: u32,
    },
    /// Show cached details for one vacancy
    Vacancy { id: String },
    /// Refresh the cached reference dictionaries
    Dictionaries,
    /// Apply to a vacancy with a resume
    Apply {
        #[arg(long)]
        resume: String,
        #[arg(long)]
        vacancy: String,
        #[arg(long, default_value = "")]
        message: String,
    },
    /// Synchronize the negotiation history
    Sync,
    /// Show the stored application history
    History {
        /// Limit to one resume
        #[arg(long)]
        resume: Option<String>,
    },
}

pub async fn run(config: AppConfig, command: Command) -> Result<()> {
    config.ensure_directories().await?;
    let db = Database::new(&config.database_path)
        .await
        .context("Failed to open database")?;
    let profiles = ProfileRepository::new(db.pool().clone());

    match command {
        Command::Login { profile } => {
            let stored = run_authorization_flow(&config, profiles.clone(), &profile).await?;
            profiles.set_active_profile(&stored.profile_name).await?;
            println!(
                "Authorized profile '{}' ({})",
                stored.profile_name,
                if stored.email.is_empty() {
                    "no email"
                } else {
                    &stored.email
                }
            );
        }

        Command::Profiles => {
            let all = profiles.list().await?;
            if all.is_empty() {
                println!("No profiles stored. Run `jobhunt login` first.");
                return Ok(());
            }
            let active = profiles.active_profile_name().await?;
            for profile in all {
                let marker = if active.as_deref() == Some(&profile.profile_name) {
                    "*"
                } else {
                    " "
                };
                println!("{} {:<20} {}", marker, profile.profile_name, profile.email);
            }
        }

        Command::Use { name } => {
            profiles.load(&name).await?;
            profiles.set_active_profile(&name).await?;
            println!("Active profile: {name}");
        }

        Command::Delete { name } => {
            if profiles.delete(&name).await? {
                println!("Deleted profile '{name}'");
            } else {
                println!("No profile named '{name}'");
            }
        }

        other => {
            // Everything below needs an authenticated client.
            let profile = profiles
                .active_profile()
                .await
                .context("No active profile. Run `jobhunt login` first")?;
            let client = Arc::new(ApiClient::new(&config, profiles.clone(), profile)?);
            let history = HistoryRepository::new(db.pool().clone());
            let classifier = StatusClassifier::new(config.classifier.clone());

            run_authenticated(other, &db, profiles, client, history, classifier).await?;
        }
    }

    Ok(())
}

async fn run_authenticated(
    command: Command,
    db: &Database,
    profiles: ProfileRepository,
    client: Arc<ApiClient>,
    history: HistoryRepository,
    classifier: StatusClassifier,
) -> Result<()> {
    let profile_name = client.profile_name().await;

    match command {
        Command::Resumes => {
            let resumes = client.my_resumes().await?;
            if resumes.items.is_empty() {
                println!("No resumes found.");
            }
            for resume in resumes.items {
                println!("{:<40} {}", resume.id, resume.title.as_deref().unwrap_or("-"));
            }
        }

        Command::Search {
            text,
            area,
            roles,
            period,
            work_format,
            similar_to,
            page,
            per_page,
        } => {
            let result = match similar_to {
                Some(resume_id) => client.similar_vacancies(&resume_id, page, per_page).await?,
                None => {
                    let params = SearchParams {
                        text,
                        area,
                        professional_roles: roles,
                        period,
                        work_format,
                        search_field: None,
                    };
                    client.search_vacancies(&params, page, per_page).await?
                }
            };

            // Flag vacancies and employers already applied to.
            let records: Vec<_> = history
                .full_history(&profile_name)
                .await?
                .iter()
                .map(|r| r.as_classified())
                .collect();
            let delivered = classifier.reduce(&records);

            println!(
                "Page {}/{} ({} found)",
                result.page + 1,
                result.pages,
                result.found
            );
            for vacancy in &result.items {
                let mut flags = String::new();
                if delivered.is_delivered_vacancy(&vacancy.id)
                    || delivered.is_delivered_key(&vacancy.name, vacancy.employer_name())
                {
                    flags.push_str(" [applied]");
                }
                if delivered.contacted_employer(vacancy.employer_name()) {
                    flags.push_str(" [known employer]");
                }
                println!(
                    "{:<12} {} | {}{}",
                    vacancy.id,
                    vacancy.name,
                    vacancy.employer_name(),
                    flags
                );
            }
        }

        Command::Vacancy { id } => {
            let cache = CacheRepository::new(db.pool().clone());
            let reference = ReferenceData::new(client, cache);
            let details = reference.vacancy_details(&id).await?;
            println!("{}", serde_json::to_string_pretty(&details)?);
        }

        Command::Dictionaries => {
            let cache = CacheRepository::new(db.pool().clone());
            let reference = ReferenceData::new(client, cache);
            let dictionaries = reference.main_dictionaries().await?;
            let areas = reference.areas().await?;
            let roles = reference.professional_roles().await?;
            println!(
                "Cached {} dictionary sections",
                dictionaries.as_object().map(|o| o.len()).unwrap_or(0)
            );
            println!(
                "Cached {} top-level areas",
                areas.as_array().map(|a| a.len()).unwrap_or(0)
            );
            println!(
                "Cached {} role categories",
                roles["categories"].as_array().map(|c| c.len()).unwrap_or(0)
            );
        }

        Command::Apply {
            resume,
            vacancy,
            message,
        } => {
            let resumes = client.my_resumes().await?;
            let resume_title = resumes
                .items
                .iter()
                .find(|r| r.id == resume)
                .and_then(|r| r.title.clone())
                .unwrap_or_default();

            let cache = CacheRepository::new(db.pool().clone());
            let reference = ReferenceData::new(client.clone(), cache);
            let details = reference.vacancy_details(&vacancy).await?;
            let vacancy_title = details["name"].as_str().unwrap_or("").to_string();
            let employer_name = details["employer"]["name"].as_str().unwrap_or("").to_string();

            let outcome = client.apply_to_vacancy(&resume, &vacancy, &message).await?;
            if outcome.ok {
                history
                    .record_apply(
                        &profile_name, &vacancy, &resume, &resume_title, &vacancy_title,
                        &employer_name, "applied", None,
                    )
                    .await?;
                println!("Applied to {vacancy_title}");
            } else {
                let reason = outcome.reason.unwrap_or_else(|| "unknown".to_string());
                history
                    .record_apply(
                        &profile_name, &vacancy, &resume, &resume_title, &vacancy_title,
                        &employer_name, "failed", Some(&reason),
                    )
                    .await?;
                println!("Apply failed: {reason}");
            }
        }

        Command::Sync => {
            let engine = SyncEngine::new(client, profiles, history, classifier);
            match engine.sync_history().await? {
                SyncOutcome::Completed(report) => {
                    println!(
                        "Synced {} records across {} pages ({} skipped), watermark {}",
                        report.records_upserted,
                        report.pages_fetched,
                        report.records_skipped,
                        report.watermark.to_rfc3339()
                    );
                }
                SyncOutcome::AlreadyRunning => {
                    println!("A sync for this profile is already running.");
                }
            }
        }

        Command::History { resume } => {
            let records = match resume {
                Some(resume_id) => history.history_for_resume(&profile_name, &resume_id).await?,
                None => history.full_history(&profile_name).await?,
            };
            if records.is_empty() {
                println!("No history yet. Run `jobhunt sync` first.");
            }
            for record in records {
                println!(
                    "{} {:<10} {:<12} {} | {}{}",
                    record.applied_at.format("%Y-%m-%d"),
                    record.status,
                    if record.was_delivered { "delivered" } else { "-" },
                    record.vacancy_title,
                    record.employer_name,
                    record
                        .reason
                        .as_deref()
                        .map(|r| format!(" ({r})"))
                        .unwrap_or_default()
                );
            }
        }

        // Handled by the caller before reaching here.
        Command::Login { .. } | Command::Profiles | Command::Use { .. } | Command::Delete { .. } => {
            unreachable!("profile management commands do not require a client")
        }
    }

    Ok(())
}
