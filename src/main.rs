use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveTime, Weekday};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use uuid::Uuid;

use nina_assist::channels::{Channel, CliChannel};
use nina_assist::config::NinaConfig;
use nina_assist::conversation::ConversationService;
use nina_assist::llm::{LlmConfig, LlmProvider, UnavailableProvider, create_provider};
use nina_assist::model::{BusinessHours, DaySchedule, Nutritionist, Patient};
use nina_assist::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = init_tracing();

    let config = NinaConfig::from_env().context("Invalid NINA_* configuration")?;

    let db: Arc<dyn Database> = match std::env::var("NINA_DB_PATH") {
        Ok(path) => Arc::new(
            LibSqlBackend::new_local(Path::new(&path))
                .await
                .with_context(|| format!("Failed to open database at {path}"))?,
        ),
        Err(_) => Arc::new(LibSqlBackend::new_memory().await?),
    };

    let llm: Arc<dyn LlmProvider> = match std::env::var("ANTHROPIC_API_KEY") {
        Ok(api_key) => {
            let model = std::env::var("NINA_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());
            let fallback_models = std::env::var("NINA_FALLBACK_MODELS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|m| !m.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();
            create_provider(&LlmConfig {
                api_key: secrecy::SecretString::from(api_key),
                model,
                fallback_models,
            })?
        }
        Err(_) => {
            tracing::warn!("ANTHROPIC_API_KEY not set, running on keyword rules only");
            Arc::new(UnavailableProvider)
        }
    };

    let (nutritionist_id, patient_id) = practice_ids(db.as_ref()).await?;

    eprintln!("🥗 {} v{}", config.assistant_name, env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm.model_name());
    eprintln!("   Type a message and press Enter. /sair to exit.\n");

    let channel = CliChannel::new(config.assistant_name.clone());
    let service = ConversationService::from_config(Arc::clone(&db), llm, config);
    let session = service.start_session(nutritionist_id, patient_id).await?;

    let mut messages = channel.start().await?;
    while let Some(msg) = messages.next().await {
        match service.handle_patient_message(session.id, &msg.content).await {
            Ok(outcome) => channel.respond(&msg, outcome.text()).await?,
            Err(e) => {
                tracing::error!(error = %e, "Failed to handle message");
                channel
                    .respond(&msg, "Desculpe, tive um problema. Tente novamente.")
                    .await?;
            }
        }
    }

    eprintln!("Até logo!");
    Ok(())
}

/// Console logging always; daily-rolling file logging when `NINA_LOG_DIR` is set.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match std::env::var("NINA_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "nina.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::registry().with(filter).with(console).init();
            None
        }
    }
}

/// Practice to chat with: `NINA_NUTRITIONIST_ID` (and optional
/// `NINA_PATIENT_ID`) when set, otherwise a freshly seeded demo practice.
async fn practice_ids(db: &dyn Database) -> anyhow::Result<(Uuid, Option<Uuid>)> {
    if let Ok(id) = std::env::var("NINA_NUTRITIONIST_ID") {
        let nutritionist_id: Uuid = id.parse().context("NINA_NUTRITIONIST_ID is not a UUID")?;
        let patient_id = std::env::var("NINA_PATIENT_ID")
            .ok()
            .map(|p| p.parse::<Uuid>())
            .transpose()
            .context("NINA_PATIENT_ID is not a UUID")?;
        return Ok((nutritionist_id, patient_id));
    }

    let (nutritionist, patient) = demo_practice()?;
    db.insert_nutritionist(&nutritionist).await?;
    db.insert_patient(&patient).await?;
    eprintln!("   Demo practice: {} / patient {}", nutritionist.name, patient.name);
    Ok((nutritionist.id, Some(patient.id)))
}

fn demo_practice() -> anyhow::Result<(Nutritionist, Patient)> {
    let time = |h: u32| NaiveTime::from_hms_opt(h, 0, 0).context("invalid demo hour");
    let weekday = DaySchedule::open(time(9)?, time(17)?);
    let saturday = DaySchedule::open(time(9)?, time(12)?);
    let hours = [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri]
        .into_iter()
        .fold(BusinessHours::new(), |hours, day| hours.with_day(day, weekday.clone()))
        .with_day(Weekday::Sat, saturday);

    let nutritionist = Nutritionist::new("Dra. Ana Souza")
        .with_business_hours(hours)
        .with_duration(60)
        .with_faq("price", "A consulta custa R$ 250,00, com retorno em até 30 dias.")
        .with_faq("location", "Atendemos na Rua das Flores, 123, sala 45, São Paulo.")
        .with_faq("online", "Sim! Também atendemos online por videochamada.");
    let patient = Patient::new(nutritionist.id, "Maria Silva").with_diet(
        "Café da manhã: 2 ovos mexidos, 1 fatia de pão integral e café sem açúcar.\n\
         Almoço: 100g de frango grelhado, arroz integral, feijão e salada à vontade.\n\
         Lanche: 1 iogurte natural com aveia.\n\
         Jantar: omelete de legumes.",
    );
    Ok((nutritionist, patient))
}
