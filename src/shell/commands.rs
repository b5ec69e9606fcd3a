//! Shell command grammar and execution
//!
//! Each input line is split into words and parsed by clap in multicall mode,
//! so the first word names the command. `train` takes the selected
//! algorithm's typed flags ([`AlgorithmFlags`]) plus any number of free-form
//! `--name value` pairs, which are coerced and validated by the session.

use clap::error::ErrorKind;
use clap::{Args, Command, CommandFactory, FromArgMatches, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::{accent, box_bottom, box_line, box_sep, box_top, kv, muted, section, step_ok, warn};
use crate::error::{CanopyError, Result};
use crate::models::Algorithm;
use crate::params::{ParamMap, ParamValue, FLAG_MARKER, INTERNAL_PREFIX};
use crate::session::{FeatEngOutcome, Session};
use crate::training::{SearchReport, TrainReport};

/// What the caller should do after a command
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Output(String),
    Quit,
}

#[derive(Parser, Debug)]
#[command(multicall = true, disable_help_subcommand = true)]
struct ShellLine {
    #[command(subcommand)]
    command: ShellCommand,
}

/// Shell commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ShellCommand {
    /// Select the algorithm: logit, tree, forest or knn
    Setmodel { model: String },
    /// Set the training file, the pipeline dump file or the export file
    Setpath { target: PathTarget, file: PathBuf },
    /// Select the scaler: none, standard, minmax, maxabs or robust
    Scaler { name: String },
    /// Select the dimensionality reducer: none, pca or lda
    Dimreduct { name: String },
    /// Feature engineering: none or auto
    Feateng { mode: String },
    /// Set the target column
    Targetcolumn { column: String },
    /// Set the random seed (positive)
    Randomstate {
        #[arg(allow_negative_numbers = true)]
        seed: i64,
    },
    /// Set the number of cross-validation folds
    Eval { folds: usize },
    /// Cross-validate, refit and dump the pipeline
    Train {
        /// Algorithm flags and free-form --name value pairs
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Grid search with nested cross-validation
    Hypersearch {
        /// Dict literal, e.g. "{'clf__C': [0.1, 1, 10]}"
        #[arg(long = "param_grid")]
        param_grid: Option<String>,
    },
    /// Predict a CSV file with the dumped pipeline
    Predict { file: PathBuf },
    /// Show the current configuration
    Config {
        /// Print JSON that `canopy --config` accepts
        #[arg(long)]
        json: bool,
    },
    /// Leave the shell
    #[command(alias = "exit")]
    Quit,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathTarget {
    Load,
    Dump,
    Export,
}

impl PathTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathTarget::Load => "Load",
            PathTarget::Dump => "Dump",
            PathTarget::Export => "Export",
        }
    }
}

// ─── Typed train flags ─────────────────────────────────────────────────────────

fn parse_limit(s: &str) -> std::result::Result<ParamValue, String> {
    if s.eq_ignore_ascii_case("none") {
        return Ok(ParamValue::None);
    }
    s.parse::<i64>()
        .map(ParamValue::Int)
        .map_err(|_| format!("expected an integer or none, got '{}'", s))
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct LogitFlags {
    /// Inverse regularization strength
    #[arg(long = "c", allow_negative_numbers = true)]
    pub c: Option<f64>,
    #[arg(long = "max_iter", allow_negative_numbers = true)]
    pub max_iter: Option<i64>,
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct TreeFlags {
    #[arg(long = "max_depth", value_parser = parse_limit, allow_negative_numbers = true)]
    pub max_depth: Option<ParamValue>,
    #[arg(long = "min_samples_leaf", allow_negative_numbers = true)]
    pub min_samples_leaf: Option<i64>,
    #[arg(long = "criterion", value_parser = ["gini", "entropy"])]
    pub criterion: Option<String>,
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct ForestFlags {
    #[arg(long = "n_estimators", allow_negative_numbers = true)]
    pub n_estimators: Option<i64>,
    #[arg(long = "max_depth", value_parser = parse_limit, allow_negative_numbers = true)]
    pub max_depth: Option<ParamValue>,
    #[arg(long = "max_features", value_parser = ["sqrt", "log2", "all"])]
    pub max_features: Option<String>,
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct KnnFlags {
    #[arg(long = "n_neighbors", allow_negative_numbers = true)]
    pub n_neighbors: Option<i64>,
    #[arg(long = "weights", value_parser = ["uniform", "distance"])]
    pub weights: Option<String>,
}

/// Typed `train` flags of the selected algorithm
#[derive(Debug, Clone, PartialEq)]
pub enum AlgorithmFlags {
    Logit(LogitFlags),
    Tree(TreeFlags),
    Forest(ForestFlags),
    Knn(KnnFlags),
}

impl AlgorithmFlags {
    /// Flag names (without `--`) understood by `algorithm`
    pub fn names(algorithm: Algorithm) -> &'static [&'static str] {
        match algorithm {
            Algorithm::Logit => &["c", "max_iter"],
            Algorithm::Tree => &["max_depth", "min_samples_leaf", "criterion"],
            Algorithm::Forest => &["n_estimators", "max_depth", "max_features"],
            Algorithm::Knn => &["n_neighbors", "weights"],
        }
    }

    pub fn parse(algorithm: Algorithm, argv: &[String]) -> Result<Self> {
        Ok(match algorithm {
            Algorithm::Logit => AlgorithmFlags::Logit(parse_args(argv)?),
            Algorithm::Tree => AlgorithmFlags::Tree(parse_args(argv)?),
            Algorithm::Forest => AlgorithmFlags::Forest(parse_args(argv)?),
            Algorithm::Knn => AlgorithmFlags::Knn(parse_args(argv)?),
        })
    }

    /// The flags that were given, as parameters
    pub fn into_params(self) -> ParamMap {
        let mut params = ParamMap::new();
        let mut put = |name: &str, value: Option<ParamValue>| {
            if let Some(value) = value {
                params.insert(name.to_string(), value);
            }
        };
        match self {
            AlgorithmFlags::Logit(f) => {
                put("c", f.c.map(ParamValue::Float));
                put("max_iter", f.max_iter.map(ParamValue::Int));
            }
            AlgorithmFlags::Tree(f) => {
                put("max_depth", f.max_depth);
                put("min_samples_leaf", f.min_samples_leaf.map(ParamValue::Int));
                put("criterion", f.criterion.map(ParamValue::Str));
            }
            AlgorithmFlags::Forest(f) => {
                put("n_estimators", f.n_estimators.map(ParamValue::Int));
                put("max_depth", f.max_depth);
                put("max_features", f.max_features.map(ParamValue::Str));
            }
            AlgorithmFlags::Knn(f) => {
                put("n_neighbors", f.n_neighbors.map(ParamValue::Int));
                put("weights", f.weights.map(ParamValue::Str));
            }
        }
        params
    }
}

fn parse_args<T: Args + FromArgMatches>(argv: &[String]) -> Result<T> {
    let command = T::augment_args(Command::new("train").no_binary_name(true));
    let matches = command.try_get_matches_from(argv).map_err(usage)?;
    T::from_arg_matches(&matches).map_err(usage)
}

fn usage(err: clap::Error) -> CanopyError {
    CanopyError::UsageError(err.render().to_string().trim_end().to_string())
}

/// Separate the algorithm's typed flags from free-form tokens.
///
/// A typed flag consumes the following token as its value. Flag names match
/// case-insensitively. Everything else is passed through, in order, for
/// coercion.
pub fn split_known(algorithm: Algorithm, args: &[String]) -> Result<(ParamMap, Vec<String>)> {
    let names = AlgorithmFlags::names(algorithm);
    let mut known_argv: Vec<String> = Vec::new();
    let mut seen: Vec<&str> = Vec::new();
    let mut unknown = Vec::new();

    let mut i = 0;
    while i < args.len() {
        let token = &args[i];
        let known = token
            .strip_prefix(FLAG_MARKER)
            .and_then(|name| names.iter().copied().find(|n| n.eq_ignore_ascii_case(name)));
        match known {
            Some(name) => {
                if seen.contains(&name) {
                    return Err(CanopyError::DuplicateParameterError(name.to_string()));
                }
                let value = args.get(i + 1).ok_or_else(|| {
                    CanopyError::ArgumentFormatError(format!("flag '{}' expects a value", token))
                })?;
                seen.push(name);
                known_argv.push(format!("{}{}", FLAG_MARKER, name));
                known_argv.push(value.clone());
                i += 2;
            }
            None => {
                unknown.push(token.clone());
                i += 1;
            }
        }
    }

    let known = AlgorithmFlags::parse(algorithm, &known_argv)?.into_params();
    Ok((known, unknown))
}

/// Split a line into words; single or double quotes group words.
pub fn split_line(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if quote.is_some() {
        return Err(CanopyError::ArgumentFormatError("unterminated quote".to_string()));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

// ─── Execution ─────────────────────────────────────────────────────────────────

/// Parse and run one shell line against `session`.
pub fn execute_line(session: &mut Session, line: &str) -> Result<Reply> {
    let words = split_line(line)?;
    if words.is_empty() {
        return Ok(Reply::Output(String::new()));
    }
    if words[0] == "help" {
        return Ok(Reply::Output(help(words.get(1).map(String::as_str))));
    }

    let parsed = match ShellLine::try_parse_from(&words) {
        Ok(parsed) => parsed,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                return Ok(Reply::Output(err.render().to_string()));
            }
            _ => return Err(usage(err)),
        },
    };
    execute(session, parsed.command, line)
}

fn help(topic: Option<&str>) -> String {
    let mut command = ShellLine::command();
    match topic.and_then(|name| command.find_subcommand_mut(name)) {
        Some(sub) => sub.render_help().to_string(),
        None => command.render_help().to_string(),
    }
}

fn execute(session: &mut Session, command: ShellCommand, line: &str) -> Result<Reply> {
    let text = match command {
        ShellCommand::Setmodel { model } => {
            let algorithm = session.set_model(&model)?;
            let flags: Vec<String> = AlgorithmFlags::names(algorithm)
                .iter()
                .map(|n| format!("{}{}", FLAG_MARKER, n))
                .collect();
            format!(
                "{}\n  {}",
                step_ok(&format!("Model set to {}", accent(algorithm.as_str()))),
                muted(&format!("train flags: {}", flags.join(" ")))
            )
        }
        ShellCommand::Setpath { target, file } => {
            let resolved = match target {
                PathTarget::Load => session.set_load_path(&file)?,
                PathTarget::Dump => session.set_dump_path(&file)?,
                PathTarget::Export => session.set_export_path(&file)?,
            };
            step_ok(&format!("{} path set to {}", target.as_str(), resolved.display()))
        }
        ShellCommand::Scaler { name } => {
            step_ok(&format!("Scaler set to {}", session.set_scaler(&name)?))
        }
        ShellCommand::Dimreduct { name } => step_ok(&format!(
            "Dimensionality reduction set to {}",
            session.set_dimreduct(&name)?
        )),
        ShellCommand::Feateng { mode } => match session.set_feateng(&mode)? {
            FeatEngOutcome::Applied { before, after } => step_ok(&format!(
                "Feature engineering applied: {} features became {}",
                before, after
            )),
            FeatEngOutcome::AlreadyApplied => {
                format!("  {}", warn("Feature engineering was already applied"))
            }
            FeatEngOutcome::Unsupported => format!(
                "  {}",
                warn("Automatic feature engineering is only available for the Forest Cover Type dataset")
            ),
            FeatEngOutcome::Reset => step_ok("Feature engineering disabled"),
        },
        ShellCommand::Targetcolumn { column } => {
            session.set_target_column(&column)?;
            step_ok(&format!("Target column set to {}", column))
        }
        ShellCommand::Randomstate { seed } => {
            session.set_random_state(seed)?;
            step_ok(&format!("Random state set to {}", seed))
        }
        ShellCommand::Eval { folds } => {
            session.set_eval(folds)?;
            step_ok(&format!("Cross-validation folds set to {}", folds))
        }
        ShellCommand::Train { args } => {
            let (mut known, unknown) = split_known(session.config().model, &args)?;
            known.insert(
                format!("{}statement", INTERNAL_PREFIX),
                ParamValue::Str(line.to_string()),
            );
            render_train(&session.train(&known, &unknown)?)
        }
        ShellCommand::Hypersearch { param_grid } => {
            render_search(&session.hypersearch(param_grid.as_deref())?)
        }
        ShellCommand::Predict { file } => {
            let (path, rows) = session.predict(&file)?;
            step_ok(&format!("Wrote {} predictions to {}", rows, path.display()))
        }
        ShellCommand::Config { json: true } => session.config().to_json()?,
        ShellCommand::Config { json: false } => {
            format!("{}\n{}", section("Configuration"), session.config())
        }
        ShellCommand::Quit => return Ok(Reply::Quit),
    };
    Ok(Reply::Output(text))
}

fn render_train(report: &TrainReport) -> String {
    let mut lines = vec![section("Train"), box_top()];
    lines.push(box_line(&kv("run", &report.run_name)));
    lines.push(box_line(&kv("pipeline", &report.stages.join(" → "))));
    lines.push(box_sep());
    for (name, value) in &report.params {
        lines.push(box_line(&kv(name, &value.to_string())));
    }
    lines.push(box_sep());
    for (name, value) in report.cv.mean.named() {
        lines.push(box_line(&kv(name, &format!("{:.4}", value))));
    }
    lines.push(box_line(&kv(
        "folds",
        &format!("{} (±{:.4})", report.cv.n_folds(), report.cv.std_balanced_accuracy),
    )));
    lines.push(box_bottom());
    lines.push(step_ok(&format!(
        "Pipeline dumped to {} in {:.2}s",
        report.dump_path.display(),
        report.elapsed_secs
    )));
    lines.join("\n")
}

fn render_search(report: &SearchReport) -> String {
    let mut lines = vec![section("Hypersearch"), box_top()];
    lines.push(box_line(&kv("candidates", &report.n_candidates.to_string())));
    lines.push(box_line(&kv("best accuracy", &format!("{:.4}", report.best_score))));
    for (name, value) in &report.best_params {
        lines.push(box_line(&kv(name, &value.to_string())));
    }
    lines.push(box_sep());
    for (name, value) in report.outer.mean.named() {
        lines.push(box_line(&kv(name, &format!("{:.4}", value))));
    }
    lines.push(box_bottom());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_split_line_quotes() {
        assert_eq!(
            split_line(r#"hypersearch --param_grid "{'c': [0.1, 1]}""#).unwrap(),
            vec!["hypersearch", "--param_grid", "{'c': [0.1, 1]}"]
        );
        assert_eq!(split_line("  train   --c  1 ").unwrap(), vec!["train", "--c", "1"]);
        assert!(split_line("predict 'a.csv").is_err());
    }

    #[test]
    fn test_split_known_separates_typed_flags() {
        let (known, unknown) =
            split_known(Algorithm::Logit, &words("--c 0.5 --tol 1e-3 --max_iter 200")).unwrap();
        assert_eq!(known["c"], ParamValue::Float(0.5));
        assert_eq!(known["max_iter"], ParamValue::Int(200));
        assert_eq!(unknown, words("--tol 1e-3"));
    }

    #[test]
    fn test_split_known_depends_on_algorithm() {
        let (known, unknown) = split_known(Algorithm::Tree, &words("--max_depth none --c 1")).unwrap();
        assert_eq!(known["max_depth"], ParamValue::None);
        assert_eq!(unknown, words("--c 1"));
    }

    #[test]
    fn test_typed_flags_match_any_case() {
        let (known, unknown) = split_known(Algorithm::Logit, &words("--C 2 --Tol 0.1")).unwrap();
        assert_eq!(known["c"], ParamValue::Float(2.0));
        assert_eq!(unknown, words("--Tol 0.1"));
    }

    #[test]
    fn test_typed_flags_accept_negative_values() {
        let (known, _) = split_known(Algorithm::Tree, &words("--min_samples_leaf -1 --max_depth -2")).unwrap();
        assert_eq!(known["min_samples_leaf"], ParamValue::Int(-1));
        assert_eq!(known["max_depth"], ParamValue::Int(-2));
    }

    #[test]
    fn test_typed_flag_errors() {
        assert!(matches!(
            split_known(Algorithm::Knn, &words("--weights heavy")),
            Err(CanopyError::UsageError(_))
        ));
        assert!(matches!(
            split_known(Algorithm::Logit, &words("--c 1 --c 2")),
            Err(CanopyError::DuplicateParameterError(name)) if name == "c"
        ));
        assert!(matches!(
            split_known(Algorithm::Logit, &words("--max_iter")),
            Err(CanopyError::ArgumentFormatError(_))
        ));
    }

    #[test]
    fn test_every_algorithm_has_flags() {
        for algorithm in Algorithm::ALL {
            assert!(!AlgorithmFlags::names(algorithm).is_empty());
            let flags = AlgorithmFlags::parse(algorithm, &[]).unwrap();
            assert!(flags.into_params().is_empty());
        }
    }

    #[test]
    fn test_parse_shell_commands() {
        let parsed = ShellLine::try_parse_from(words("train --c 1 --foo bar")).unwrap();
        assert_eq!(
            parsed.command,
            ShellCommand::Train { args: words("--c 1 --foo bar") }
        );
        let parsed = ShellLine::try_parse_from(words("randomstate -5")).unwrap();
        assert_eq!(parsed.command, ShellCommand::Randomstate { seed: -5 });
        let parsed = ShellLine::try_parse_from(words("setpath dump data/model.bin")).unwrap();
        assert_eq!(
            parsed.command,
            ShellCommand::Setpath { target: PathTarget::Dump, file: PathBuf::from("data/model.bin") }
        );
        assert!(ShellLine::try_parse_from(words("setpath nowhere x")).is_err());
        assert!(ShellLine::try_parse_from(words("setmodel")).is_err());
    }
}
