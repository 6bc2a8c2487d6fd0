use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use polarity_core::config::{load_dotenv, Config, Credentials, EncoderMode};
use polarity_core::dialogue::{
    DialogueAgent, DialogueExperiment, ExperimentLog, LogSummary, ReplyLimits, TurnRecord,
};
use polarity_core::prompt::{compose, TemplateKind};
use polarity_core::provider::{ClovaProvider, Message, Provider};
use polarity_core::rag::{
    build_encoder, chunk_snippets, cosine_similarity, load_snippets, Encoder, HashingEncoder,
    RagError, RetrievalAgent,
};
use polarity_core::Comparison;
use polarity_persona::PersonaRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

#[derive(Parser)]
#[command(name = "polarity")]
#[command(about = "Run bias-propagation experiments on retrieval-augmented dialogue agents", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(short, long, global = true, default_value = "polarity.yaml")]
    config: PathBuf,

    #[arg(long, global = true, help = "Skip the chat API; every turn uses a fallback response")]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run a two-agent dialogue experiment")]
    Run {
        #[arg(short, long)]
        topic: String,

        #[arg(short, long, default_value = "experiment")]
        name: String,

        #[arg(long, help = "Corpus file or directory for the left agent (raw model if omitted)")]
        left_corpus: Option<PathBuf>,

        #[arg(long, help = "Corpus file or directory for the right agent (raw model if omitted)")]
        right_corpus: Option<PathBuf>,

        #[arg(long, help = "Load saved indexes named 'left' and 'right' from this directory")]
        index_dir: Option<PathBuf>,

        #[arg(long, default_value = "base", help = "Temperament of the left agent (base or detox)")]
        left_model: String,

        #[arg(long, default_value = "base", help = "Temperament of the right agent (base or detox)")]
        right_model: String,

        #[arg(long, help = "Number of turns (overrides config)")]
        turns: Option<usize>,

        #[arg(long, help = "First message for the left agent")]
        initial_prompt: Option<String>,

        #[arg(long, help = "Seed for fallback responses (overrides config)")]
        seed: Option<u64>,

        #[arg(short, long, help = "Where to write the log (defaults to the configured output directory)")]
        output: Option<PathBuf>,
    },

    #[command(about = "Run a base/base control group and a detox/detox experimental group")]
    Contrast {
        #[arg(short, long)]
        topic: String,

        #[arg(long)]
        left_corpus: Option<PathBuf>,

        #[arg(long)]
        right_corpus: Option<PathBuf>,

        #[arg(long, help = "Load saved indexes named 'left' and 'right' from this directory")]
        index_dir: Option<PathBuf>,

        #[arg(long, help = "Number of turns per group (overrides config)")]
        turns: Option<usize>,

        #[arg(long, help = "Seed for fallback responses (overrides config)")]
        seed: Option<u64>,

        #[arg(short, long, help = "Directory for both logs (defaults to the configured output directory)")]
        output_dir: Option<PathBuf>,
    },

    #[command(about = "Compare a neutral model against stance RAG agents")]
    Compare {
        #[arg(short, long, required = true, help = "Question to ask; repeat for several")]
        query: Vec<String>,

        #[arg(long, required = true, value_parser = parse_labeled, help = "LABEL=PATH corpus; repeat for several")]
        corpus: Vec<(String, PathBuf)>,
    },

    #[command(about = "Ask one persona a single question")]
    Ask {
        question: String,

        #[arg(short, long, default_value = "neutral")]
        stance: String,

        #[arg(short, long, default_value = "base")]
        model: String,

        #[arg(long)]
        corpus: Option<PathBuf>,
    },

    #[command(about = "Build and save an index from a corpus")]
    Index {
        #[arg(long)]
        corpus: PathBuf,

        #[arg(short, long)]
        name: String,

        #[arg(short, long, default_value = "./index")]
        out: PathBuf,
    },

    #[command(about = "Cosine similarity of two texts under the configured encoder")]
    Similarity { first: String, second: String },

    #[command(about = "Print a saved dialogue log")]
    Show { log: PathBuf },
}

fn parse_labeled(value: &str) -> std::result::Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((label, path)) if !label.is_empty() && !path.is_empty() => {
            Ok((label.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected LABEL=PATH, got '{}'", value)),
    }
}

/// Everything a command needs, resolved once at startup.
struct Session {
    config: Config,
    provider: Option<Arc<dyn Provider>>,
    registry: PersonaRegistry,
    offline: bool,
}

impl Session {
    fn new(config_path: &Path, offline: bool) -> Result<Self> {
        let config = if config_path.exists() {
            Config::load(config_path).context("Failed to load config")?
        } else {
            Config::default()
        };
        let config = config.with_env_overrides();

        let provider: Option<Arc<dyn Provider>> = if offline {
            None
        } else {
            let credentials = Credentials::from_env()?;
            let provider = ClovaProvider::new(&config.clova, &credentials)
                .context("Failed to create CLOVA client")?;
            Some(Arc::new(provider))
        };

        Ok(Self {
            config,
            provider,
            registry: PersonaRegistry::with_defaults(),
            offline,
        })
    }

    fn require_provider(&self) -> Result<Arc<dyn Provider>> {
        match &self.provider {
            Some(provider) => Ok(provider.clone()),
            None => bail!("this command needs the chat API; drop --offline"),
        }
    }

    fn encoder(&self) -> Result<Arc<dyn Encoder>> {
        match build_encoder(&self.config.rag.encoder, self.provider.clone()) {
            Ok(encoder) => Ok(encoder),
            Err(RagError::EncoderUnavailable(model)) if self.offline => {
                let dimension = match self.config.rag.encoder {
                    EncoderMode::Clova { dimension, .. } | EncoderMode::Hashing { dimension } => dimension,
                };
                warn!(model = %model, dimension, "Offline: using the hashing encoder instead");
                Ok(Arc::new(HashingEncoder::new(dimension)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn load_corpus(&self, label: &str, path: &Path) -> Result<RetrievalAgent> {
        let snippets = load_snippets(path)
            .with_context(|| format!("Failed to read corpus {}", path.display()))?;
        let chunks = chunk_snippets(
            snippets,
            self.config.rag.chunk_size,
            self.config.rag.chunk_overlap,
        );

        let mut agent = RetrievalAgent::with_encoder(label, self.encoder()?);
        agent
            .add_texts(chunks)
            .await
            .with_context(|| format!("Failed to index corpus {}", path.display()))?;
        Ok(agent)
    }

    async fn retrieval_for(
        &self,
        stance: &str,
        corpus: Option<&Path>,
        index_dir: Option<&Path>,
    ) -> Result<Option<RetrievalAgent>> {
        if let Some(dir) = index_dir {
            let agent = RetrievalAgent::load(dir, stance, self.encoder()?)
                .await
                .with_context(|| format!("Failed to load index '{}' from {}", stance, dir.display()))?;
            return Ok(Some(agent));
        }
        match corpus {
            Some(path) => Ok(Some(self.load_corpus(stance, path).await?)),
            None => Ok(None),
        }
    }

    fn agent(
        &self,
        name: &str,
        stance: &str,
        model_type: &str,
        retrieval: Option<RetrievalAgent>,
        seed: Option<u64>,
    ) -> Result<DialogueAgent> {
        let persona = self.registry.persona(stance)?.clone();
        let temperament = self.registry.temperament(model_type)?;
        let dialogue = &self.config.dialogue;

        let mut agent = DialogueAgent::new(name, persona, temperament)
            .with_sampling(self.config.sampling.clone())
            .with_retry(self.config.retry.policy())
            .with_history_window(dialogue.history_window)
            .with_limits(ReplyLimits {
                max_lines: dialogue.max_reply_lines,
                max_chars: dialogue.max_reply_chars,
            });
        if let Some(provider) = &self.provider {
            agent = agent.with_provider(provider.clone());
        }
        if let Some(retrieval) = retrieval {
            agent = agent.with_retrieval(retrieval, self.config.rag.top_k);
        }
        if let Some(seed) = seed {
            agent = agent.with_seed(seed);
        }
        Ok(agent)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("polarity_core=info")),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Show { log } = &cli.command {
        return show_log(log);
    }
    let ctx = Session::new(&cli.config, cli.offline)?;

    match cli.command {
        Commands::Run {
            topic,
            name,
            left_corpus,
            right_corpus,
            index_dir,
            left_model,
            right_model,
            turns,
            initial_prompt,
            seed,
            output,
        } => {
            let left = ctx
                .retrieval_for("left", left_corpus.as_deref(), index_dir.as_deref())
                .await?;
            let right = ctx
                .retrieval_for("right", right_corpus.as_deref(), index_dir.as_deref())
                .await?;
            let seed = seed.or(ctx.config.dialogue.seed);

            let left = ctx.agent("Agent_L", "left", &left_model, left, seed)?;
            let right = ctx.agent(
                "Agent_R",
                "right",
                &right_model,
                right,
                seed.map(|s| s.wrapping_add(1)),
            )?;

            let n_turns = turns.unwrap_or(ctx.config.dialogue.n_turns);
            let mut experiment =
                DialogueExperiment::new(name, topic, Box::new(left), Box::new(right), n_turns)
                    .with_turn_delay(ctx.config.dialogue.turn_delay());
            if let Some(prompt) = initial_prompt {
                experiment = experiment.with_initial_prompt(prompt);
            }
            run_experiment(experiment, output, &ctx.config.dialogue.output_dir)
                .await
                .map(|_| ())
        }
        Commands::Contrast {
            topic,
            left_corpus,
            right_corpus,
            index_dir,
            turns,
            seed,
            output_dir,
        } => {
            let left = ctx
                .retrieval_for("left", left_corpus.as_deref(), index_dir.as_deref())
                .await?;
            let right = ctx
                .retrieval_for("right", right_corpus.as_deref(), index_dir.as_deref())
                .await?;
            let output_dir =
                output_dir.unwrap_or_else(|| PathBuf::from(&ctx.config.dialogue.output_dir));
            let groups = ContrastRun {
                topic,
                left,
                right,
                n_turns: turns.unwrap_or(ctx.config.dialogue.n_turns),
                seed: seed.or(ctx.config.dialogue.seed),
            };
            let summaries = contrast(&ctx, groups, &output_dir).await?;
            print_summaries(&summaries);
            Ok(())
        }
        Commands::Compare { query, corpus } => compare(&ctx, &query, &corpus).await,
        Commands::Ask {
            question,
            stance,
            model,
            corpus,
        } => ask(&ctx, &question, &stance, &model, corpus.as_deref()).await,
        Commands::Index { corpus, name, out } => index(&ctx, &corpus, &name, &out).await,
        Commands::Similarity { first, second } => similarity(&ctx, &first, &second).await,
        Commands::Show { log } => show_log(&log),
    }
}

fn print_record(record: &TurnRecord) {
    let speaker = format!("[{} · {} · {}]", record.speaker, record.stance, record.model_type);
    let speaker = if record.stance == "left" {
        speaker.blue().bold()
    } else {
        speaker.red().bold()
    };
    println!("{} {}", format!("Turn {}", record.turn).dimmed(), speaker);
    if record.degraded {
        println!("  {} {}", "(fallback)".yellow(), record.message);
    } else {
        println!("  {}", record.message);
    }
    println!();
}

async fn run_experiment(
    mut experiment: DialogueExperiment,
    output: Option<PathBuf>,
    output_dir: impl AsRef<Path>,
) -> Result<(ExperimentLog, PathBuf)> {
    println!(
        "{} {} turns on \"{}\"",
        "→".blue(),
        experiment.n_turns(),
        experiment.log().topic.cyan()
    );
    println!();

    while let Some(record) = experiment.step().await {
        print_record(record);
    }
    let log = experiment.finish();

    let path = match output {
        Some(path) => {
            log.save(&path).context("Failed to save log")?;
            path
        }
        None => log.save_in(output_dir).context("Failed to save log")?,
    };

    println!(
        "{} {} records ({} degraded) saved to {}",
        "✓".green().bold(),
        log.dialogue.len(),
        log.degraded_count(),
        path.display().to_string().bold()
    );
    Ok((log, path))
}

/// Temperament pairing of each group, run in this order.
const GROUPS: [(&str, &str); 2] = [("control_group", "base"), ("experimental_group", "detox")];

struct ContrastRun {
    topic: String,
    left: Option<RetrievalAgent>,
    right: Option<RetrievalAgent>,
    n_turns: usize,
    seed: Option<u64>,
}

/// Runs both groups on the same topic and corpora and saves one log per group.
async fn contrast(ctx: &Session, run: ContrastRun, output_dir: &Path) -> Result<Vec<LogSummary>> {
    let mut summaries = Vec::with_capacity(GROUPS.len());
    for (name, model_type) in GROUPS {
        println!("{} {} ({} vs {})", "▶".magenta(), name.bold(), model_type, model_type);

        let left = ctx.agent("Agent_L", "left", model_type, run.left.clone(), run.seed)?;
        let right = ctx.agent(
            "Agent_R",
            "right",
            model_type,
            run.right.clone(),
            run.seed.map(|s| s.wrapping_add(1)),
        )?;
        let experiment =
            DialogueExperiment::new(name, &run.topic, Box::new(left), Box::new(right), run.n_turns)
                .with_turn_delay(ctx.config.dialogue.turn_delay());

        let (log, _) = run_experiment(experiment, None, output_dir).await?;
        summaries.push(log.summary());
    }
    Ok(summaries)
}

fn print_summary(summary: &LogSummary) {
    println!(
        "  Records: {} ({} degraded), mean length {:.1} chars",
        summary.records, summary.degraded, summary.mean_chars
    );
}

fn print_summaries(summaries: &[LogSummary]) {
    println!("{}", "Summary".bold().green());
    for summary in summaries {
        println!("{}", summary.experiment_name.cyan());
        print_summary(summary);
    }
}

async fn compare(ctx: &Session, queries: &[String], corpora: &[(String, PathBuf)]) -> Result<()> {
    let mut comparison = Comparison::new(ctx.require_provider()?).with_retry(ctx.config.retry.policy());
    for (label, path) in corpora {
        comparison = comparison.with_agent(ctx.load_corpus(label, path).await?);
    }

    for query in queries {
        let report = comparison.run(query).await;
        println!("{} {}", "Question:".bold().green(), query);
        println!();
        for answer in std::iter::once(&report.baseline).chain(&report.stances) {
            println!("{}", format!("[{}]", answer.label).bold().cyan());
            for (i, reference) in answer.references.iter().enumerate() {
                println!(
                    "  {} {} ({:.3})",
                    format!("ref {}", i + 1).dimmed(),
                    reference.document.text,
                    reference.score
                );
            }
            match &answer.error {
                Some(error) => println!("  {} {}", "error:".red(), error),
                None => println!("  {}", answer.text),
            }
            println!();
        }
    }
    Ok(())
}

async fn ask(
    ctx: &Session,
    question: &str,
    stance: &str,
    model_type: &str,
    corpus: Option<&Path>,
) -> Result<()> {
    let provider = ctx.require_provider()?;
    let persona = ctx.registry.persona(stance)?;
    let temperament = ctx.registry.temperament(model_type)?;

    let (references, kind) = match corpus {
        Some(path) => {
            let agent = ctx.load_corpus(stance, path).await?;
            let references = agent.retrieve(question, ctx.config.rag.top_k).await?;
            (
                references,
                TemplateKind::StanceAware {
                    stance: stance.to_string(),
                },
            )
        }
        None => (Vec::new(), TemplateKind::Plain),
    };

    let messages = [
        Message::system(temperament.system_prompt(persona)),
        Message::user(compose(&references, question, &kind)),
    ];
    let completion = ctx
        .config
        .retry
        .policy()
        .chat(provider.as_ref(), &messages, &ctx.config.sampling)
        .await
        .context("Chat request failed")?;

    for (i, reference) in references.iter().enumerate() {
        println!("{} {}", format!("[ref {}]", i + 1).dimmed(), reference.document.text);
    }
    println!("{}", completion.content);
    if let Some(usage) = completion.usage {
        println!(
            "{}",
            format!("tokens: {} in / {} out", usage.input_tokens, usage.output_tokens).dimmed()
        );
    }
    Ok(())
}

async fn index(ctx: &Session, corpus: &Path, name: &str, out: &Path) -> Result<()> {
    let agent = ctx.load_corpus(name, corpus).await?;
    agent
        .save(out, name)
        .await
        .with_context(|| format!("Failed to save index to {}", out.display()))?;

    println!(
        "{} Indexed {} snippets as '{}' in {} ({})",
        "✓".green().bold(),
        agent.len(),
        name.cyan(),
        out.display(),
        agent.store().model_id()
    );
    Ok(())
}

async fn similarity(ctx: &Session, first: &str, second: &str) -> Result<()> {
    let encoder = ctx.encoder()?;
    let a = encoder.encode(first).await.context("Failed to encode first text")?;
    let b = encoder.encode(second).await.context("Failed to encode second text")?;

    println!(
        "{}: {:.4} ({})",
        "Cosine similarity".bold(),
        cosine_similarity(&a, &b),
        encoder.model_id()
    );
    Ok(())
}

fn show_log(path: &Path) -> Result<()> {
    let log = ExperimentLog::load(path).context("Failed to load log")?;

    println!("{}", log.experiment_name.bold().green());
    println!("  Topic:   {}", log.topic.cyan());
    println!(
        "  Agents:  {} ({}, {}) vs {} ({}, {})",
        log.agents.agent_l.name,
        log.agents.agent_l.stance,
        log.agents.agent_l.model_type,
        log.agents.agent_r.name,
        log.agents.agent_r.stance,
        log.agents.agent_r.model_type
    );
    println!("  Started: {}", log.start_time.to_rfc3339());
    if let Some(end) = log.end_time {
        println!("  Ended:   {}", end.to_rfc3339());
    }
    print_summary(&log.summary());
    println!();

    for record in &log.dialogue {
        print_record(record);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labeled() {
        assert_eq!(
            parse_labeled("boomer=data/boomer.txt").unwrap(),
            ("boomer".to_string(), PathBuf::from("data/boomer.txt"))
        );
        assert!(parse_labeled("no-separator").is_err());
        assert!(parse_labeled("=path").is_err());
    }

    #[test]
    fn test_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from([
            "polarity", "run", "--topic", "t", "--config", "other.yaml", "--offline",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("other.yaml"));
        assert!(cli.offline);
    }

    #[tokio::test]
    async fn test_contrast_runs_both_groups_offline() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = Session::new(&dir.path().join("missing.yaml"), true).unwrap();
        ctx.config.dialogue.turn_delay_ms = 0;
        let run = ContrastRun {
            topic: "crowd safety".to_string(),
            left: None,
            right: None,
            n_turns: 2,
            seed: Some(5),
        };

        let summaries = contrast(&ctx, run, dir.path()).await.unwrap();

        let names: Vec<&str> = summaries.iter().map(|s| s.experiment_name.as_str()).collect();
        assert_eq!(names, vec!["control_group", "experimental_group"]);
        assert!(summaries.iter().all(|s| s.records == 4 && s.degraded == 4));
        assert!(summaries.iter().all(|s| s.mean_chars > 0.0));

        let mut saved: Vec<ExperimentLog> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| ExperimentLog::load(entry.unwrap().path()).unwrap())
            .collect();
        saved.sort_by(|a, b| a.experiment_name.cmp(&b.experiment_name));
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].agents.agent_l.model_type, "base");
        assert_eq!(saved[1].agents.agent_r.model_type, "detox");
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "polarity", "--offline", "run", "--topic", "crowd safety", "--turns", "3", "--seed", "7",
        ])
        .unwrap();
        assert!(cli.offline);
        match cli.command {
            Commands::Run { topic, turns, seed, .. } => {
                assert_eq!(topic, "crowd safety");
                assert_eq!(turns, Some(3));
                assert_eq!(seed, Some(7));
            }
            _ => panic!("expected run"),
        }
    }
}
