//! nl2cmd - Natural Language to Shell Command Decoding
//!
//! Main CLI entry point for decoding model beams, encoding sentences and
//! checking commands against a grammar.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use nl2cmd::config::Nl2CmdConfig;
use nl2cmd::grammar::GrammarKind;
use nl2cmd::inference::{BatchInput, BeamPipeline, DecodeMode, ReportFormatter, Results};
use nl2cmd::slot::KnnClassifier;
use nl2cmd::store::{record_prediction, JsonlStore, PredictionStore, RecordOutcome};
use nl2cmd::vocab::Vocabulary;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nl2cmd")]
#[command(version)]
#[command(about = "Decode model output beams into validated shell commands", long_about = None)]
struct Cli {
    /// Config file (default: nl2cmd.toml in the current directory or a parent)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a JSON batch of model beams
    Decode(DecodeArgs),

    /// Encode a sentence into vocabulary ids
    Encode {
        /// Whitespace-tokenized sentence
        sentence: String,

        /// Vocabulary file (default: decode.source_vocab)
        #[arg(long)]
        vocab: Option<PathBuf>,

        /// Substitute unknown words by their type placeholder
        #[arg(long)]
        typed: bool,
    },

    /// Check a command against a grammar and print its template
    Parse {
        /// Command text
        command: String,

        /// Grammar backend (bash, bash_strict, paren)
        #[arg(long)]
        grammar: Option<GrammarKind>,
    },
}

#[derive(Args)]
struct DecodeArgs {
    /// Batch file, "-" for stdin
    #[arg(short, long, default_value = "-")]
    input: PathBuf,

    /// Target token vocabulary (default: decode.target_vocab)
    #[arg(long)]
    vocab: Option<PathBuf>,

    /// Target character vocabulary
    #[arg(long)]
    char_vocab: Option<PathBuf>,

    /// Decoding algorithm (greedy, beam_search)
    #[arg(long)]
    algorithm: Option<DecodeMode>,

    /// Beam width the model decoded with
    #[arg(long)]
    beam_size: Option<usize>,

    /// Accepted hypotheses per batch
    #[arg(long)]
    cap: Option<usize>,

    /// Grammar backend (bash, bash_strict, paren)
    #[arg(long)]
    grammar: Option<GrammarKind>,

    /// Keep ungrammatical candidates as plain text
    #[arg(long)]
    lenient: bool,

    /// Accept any output text without parsing
    #[arg(long)]
    explain: bool,

    /// Target vocabulary is character-level
    #[arg(long)]
    char_mode: bool,

    /// Print character-based companion predictions
    #[arg(long)]
    char_outputs: bool,

    /// k-NN slot-filling classifier parameters (JSON)
    #[arg(long)]
    classifier: Option<PathBuf>,

    /// Ignore entity fillers
    #[arg(long)]
    no_slot_filling: bool,

    /// Record predictions in this JSON-lines store
    #[arg(long)]
    store: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "nl2cmd=debug" } else { "nl2cmd=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<Nl2CmdConfig> {
    match path {
        Some(path) => Nl2CmdConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Nl2CmdConfig::load_from_cwd().context("Failed to load nl2cmd.toml"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Decode(args) => cmd_decode(config, &args),
        Commands::Encode {
            sentence,
            vocab,
            typed,
        } => cmd_encode(&config, &sentence, vocab.as_deref(), typed),
        Commands::Parse { command, grammar } => {
            cmd_parse(grammar.unwrap_or(config.decode.grammar), &command)
        }
    }
}

fn apply_overrides(config: &mut Nl2CmdConfig, args: &DecodeArgs) {
    let decode = &mut config.decode;
    if let Some(vocab) = &args.vocab {
        decode.target_vocab = vocab.clone();
    }
    if let Some(char_vocab) = &args.char_vocab {
        decode.char_vocab = Some(char_vocab.clone());
    }
    if let Some(algorithm) = args.algorithm {
        decode.algorithm = algorithm;
    }
    if let Some(beam_size) = args.beam_size {
        decode.beam_size = beam_size;
    }
    if let Some(cap) = args.cap {
        decode.cap = cap;
    }
    if let Some(grammar) = args.grammar {
        decode.grammar = grammar;
    }
    decode.grammatical_only &= !args.lenient;
    decode.explain |= args.explain;
    decode.char_mode |= args.char_mode;
    decode.char_outputs |= args.char_outputs;

    if let Some(classifier) = &args.classifier {
        config.slot_filling.classifier = Some(classifier.clone());
    }
    config.slot_filling.enabled &= !args.no_slot_filling;
    if let Some(store) = &args.store {
        config.store.path = Some(store.clone());
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read batch from stdin")?;
        return Ok(text);
    }
    fs::read_to_string(path).with_context(|| format!("Failed to read batch {}", path.display()))
}

fn cmd_decode(mut config: Nl2CmdConfig, args: &DecodeArgs) -> Result<()> {
    apply_overrides(&mut config, args);
    config.validate()?;
    let decode = &config.decode;

    let vocab_path = &decode.target_vocab;
    let vocab = if decode.char_mode {
        Vocabulary::load_chars(vocab_path)
    } else {
        Vocabulary::load_tokens(vocab_path)
    }
    .with_context(|| format!("Failed to load vocabulary {}", vocab_path.display()))?;

    let char_vocab = match &decode.char_vocab {
        Some(path) => Some(
            Vocabulary::load_chars(path)
                .with_context(|| format!("Failed to load character vocabulary {}", path.display()))?,
        ),
        None => None,
    };

    let classifier = match &config.slot_filling.classifier {
        Some(path) => Some(
            KnnClassifier::load(path)
                .with_context(|| format!("Failed to load classifier {}", path.display()))?,
        ),
        None => None,
    };

    let batch = BatchInput::from_json(&read_input(&args.input)?)?;
    let grammar = decode.grammar.build();

    let mut pipeline = BeamPipeline::new(&vocab, grammar.as_ref(), config.pipeline_options());
    if let Some(char_vocab) = &char_vocab {
        pipeline = pipeline.with_char_vocab(char_vocab);
    }
    if let Some(classifier) = &classifier {
        pipeline = pipeline.with_scorer(classifier);
    }

    let output = pipeline.decode_batch(&batch.examples)?;
    tracing::info!(
        examples = output.stats.examples,
        accepted = output.stats.accepted,
        rejected = output.stats.rejected(),
        cap_hit = output.stats.cap_hit,
        "decoded batch"
    );

    let formatter = ReportFormatter::new(decode.beam_size)
        .with_display_cap(decode.display_cap)
        .with_chars(decode.char_outputs);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{}", formatter.format_batch(&batch.examples, &output));
    }

    if let Some(path) = &config.store.path {
        let mut store = JsonlStore::new(path).with_ascii_only(config.store.ascii_only);
        store
            .create_schema()
            .with_context(|| format!("Failed to open prediction store {}", path.display()))?;
        if config.store.fresh {
            let removed = store.remove_model(&config.store.model_id)?;
            tracing::debug!(removed, model_id = %config.store.model_id, "cleared previous predictions");
        }

        // Every greedy prediction is stored; beams only as far as they are shown
        let stored: Vec<_> = match &output.results {
            Results::Flat(set) => set.hypotheses().iter().collect(),
            Results::Nested(sets) => sets
                .iter()
                .flat_map(|set| formatter.displayed(set))
                .collect(),
        };
        let mut degraded = 0;
        for h in stored {
            let input = batch
                .examples
                .get(h.example)
                .map(|e| e.input.as_str())
                .unwrap_or("");
            let outcome = record_prediction(
                &mut store,
                &config.store.model_id,
                input,
                &h.text,
                h.score,
                config.store.update_mode,
            );
            if outcome != RecordOutcome::Stored {
                degraded += 1;
            }
        }
        if degraded > 0 {
            eprintln!("{} predictions were stored in a degraded form", degraded);
        }
    }

    Ok(())
}

fn cmd_encode(config: &Nl2CmdConfig, sentence: &str, vocab: Option<&Path>, typed: bool) -> Result<()> {
    let path = vocab.unwrap_or(config.decode.source_vocab.as_path());
    let vocab = Vocabulary::load_tokens(path)
        .with_context(|| format!("Failed to load vocabulary {}", path.display()))?;

    let ids = vocab.encode(sentence, typed);
    let rendered: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    println!("{}", rendered.join(" "));
    println!("{}", vocab.ids_to_sentence(&ids));
    Ok(())
}

fn cmd_parse(kind: GrammarKind, command: &str) -> Result<()> {
    let grammar = kind.build();
    let normalized = grammar.normalize(command);
    let Some(tree) = grammar.parse(&normalized) else {
        bail!("Not a grammatical {} command: {}", grammar.name(), command);
    };
    println!("Command:  {}", grammar.render(&tree));
    println!("Template: {}", grammar.template_of(&tree));
    Ok(())
}
