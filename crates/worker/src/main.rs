use anyhow::Context;
use clap::Parser;
use signalboard_core::dashboard;
use signalboard_core::domain::market::by_score_desc;
use signalboard_core::domain::recommendation::HorizonMode;
use signalboard_core::engine::Strategy;
use signalboard_core::llm::gemini::GeminiClient;
use signalboard_core::llm::{error::advisory_message, prompt, CommentaryClient};
use signalboard_core::storage::PgStore;
use signalboard_core::time::freshness::parse_timestamp;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod report;

#[derive(Debug, Parser)]
#[command(name = "signalboard_worker")]
struct Args {
    /// Owner of the portfolio to evaluate.
    #[arg(long)]
    user_id: Uuid,

    /// banding (list view) or weighted.
    #[arg(long, default_value = "banding")]
    strategy: Strategy,

    /// Report one instrument in detail (always weighted).
    #[arg(long)]
    code: Option<String>,

    /// Force the horizon for --code (short|long).
    #[arg(long)]
    mode: Option<HorizonMode>,

    /// Append AI commentary.
    #[arg(long)]
    ai: bool,

    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Evaluate as of this RFC 3339 instant instead of the current time.
    #[arg(long)]
    now: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = signalboard_core::config::Settings::from_env();
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();
    settings.warn_missing();

    let args = Args::parse();

    let now = match args.now.as_deref() {
        Some(s) => parse_timestamp(s).with_context(|| format!("invalid --now: {s:?}"))?,
        None => chrono::Utc::now(),
    };

    let store = PgStore::connect(settings.require_database_url()?).await?;

    let (mut json, prompt) = match args.code.as_deref() {
        Some(code) => {
            let detail = dashboard::load_detail(&store, args.user_id, code, args.mode, now)
                .await?
                .with_context(|| format!("no analysis rows for {code}"))?;

            if !args.json {
                print!("{}", report::render_detail(&detail));
            }
            let prompt = prompt::stock_detail(
                &detail.record,
                &detail.recommendation,
                detail.position.as_ref(),
            );
            (serde_json::to_value(&detail)?, prompt)
        }
        None => {
            let dash = dashboard::load_dashboard(&store, args.user_id, args.strategy, now).await?;

            if !args.json {
                print!("{}", report::render_dashboard(&dash));
            }
            let json = serde_json::to_value(&dash)?;
            let mut records: Vec<_> = dash.rows.into_iter().map(|r| r.record).collect();
            records.sort_by(by_score_desc);
            (json, prompt::market_overview(&records))
        }
    };

    if args.ai {
        let result = match GeminiClient::from_settings(&settings) {
            Ok(client) => client.generate(&prompt).await,
            Err(err) => Err(err),
        };
        let ai = match result {
            Ok(commentary) => report::AiSection {
                text: commentary.text,
                sources: commentary.sources,
                degraded: false,
            },
            Err(err) => {
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "AI commentary failed");
                report::AiSection {
                    text: advisory_message(&err),
                    sources: Vec::new(),
                    degraded: true,
                }
            }
        };
        if args.json {
            report::attach_ai(&mut json, &ai)?;
        } else {
            print!("{}", report::render_ai(&ai));
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&json)?);
    }

    Ok(())
}

fn init_sentry(settings: &signalboard_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
