//! File ingestion: the parameter CSV, the transition CSV, and the braced
//! key-value resume format.

use crate::model::{StateMap, TransitionModel};
use crate::parameters::ParameterSettings;
use crate::transition::Transition;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;
use stm_common::{Error, ParName, PrevalenceModel, PriorDist, PriorFamily, Result};

/// One parsed resume block: key -> whitespace-separated values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerializationData {
    entries: BTreeMap<String, Vec<String>>,
}

impl SerializationData {
    /// Parse the body of one block (no braces): each non-empty line is
    /// `<key> <value> <value>...`, quote-stripped and trimmed.
    pub fn parse_block(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in text.lines() {
            let line = clean_line(line);
            if line.is_empty() {
                continue;
            }
            let mut tokens = line.split_whitespace();
            if let Some(key) = tokens.next() {
                entries.insert(key.to_string(), tokens.map(str::to_string).collect());
            }
        }
        Self { entries }
    }

    pub fn strings(&self, key: &str) -> Result<&[String]> {
        self.entries
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::ResumeCorrupt(format!("missing key `{key}`")))
    }

    /// Parse every value under `key`.
    pub fn vector<T: FromStr>(&self, key: &str) -> Result<Vec<T>> {
        self.strings(key)?
            .iter()
            .map(|raw| {
                raw.parse().map_err(|_| {
                    Error::ResumeCorrupt(format!("cannot parse `{raw}` under key `{key}`"))
                })
            })
            .collect()
    }

    /// Parse the single value under `key`.
    pub fn scalar<T: FromStr>(&self, key: &str) -> Result<T> {
        let values = self.strings(key)?;
        match values {
            [raw] => raw.parse().map_err(|_| {
                Error::ResumeCorrupt(format!("cannot parse `{raw}` under key `{key}`"))
            }),
            _ => Err(Error::ResumeCorrupt(format!(
                "key `{key}` holds {} values, expected one",
                values.len()
            ))),
        }
    }
}

fn clean_line(line: &str) -> String {
    line.replace('"', "").trim().to_string()
}

/// Parse a resume file into its named blocks.
///
/// The format is line-oriented: a bare block name, an opening `{`, one
/// `<key> <values...>` line per entry, a closing `}`.
pub fn read_resume(path: &Path) -> Result<BTreeMap<String, SerializationData>> {
    let file = File::open(path)?;
    parse_resume(BufReader::new(file))
}

/// Parse resume blocks from any line source.
pub fn parse_resume<R: BufRead>(reader: R) -> Result<BTreeMap<String, SerializationData>> {
    let mut blocks = BTreeMap::new();
    let mut pending_name: Option<String> = None;
    let mut open_block: Option<(String, String)> = None;

    for line in reader.lines() {
        let line = clean_line(&line?);
        if line.is_empty() {
            continue;
        }
        if open_block.is_none() {
            if line == "{" {
                match pending_name.take() {
                    Some(name) => open_block = Some((name, String::new())),
                    None => {
                        return Err(Error::ResumeCorrupt("block opened without a name".into()));
                    }
                }
            } else if pending_name.is_some() {
                return Err(Error::ResumeCorrupt(format!(
                    "expected `{{` after block name, found `{line}`"
                )));
            } else {
                pending_name = Some(line);
            }
        } else if line == "}" {
            if let Some((name, body)) = open_block.take() {
                blocks.insert(name, SerializationData::parse_block(&body));
            }
        } else if let Some((_, body)) = open_block.as_mut() {
            body.push_str(&line);
            body.push('\n');
        }
    }
    if let Some((name, _)) = open_block {
        return Err(Error::ResumeCorrupt(format!("block `{name}` never closed")));
    }
    Ok(blocks)
}

/// Read the parameter file: initial settings plus the prior for each name.
pub fn read_parameters(
    path: &Path,
) -> Result<(Vec<ParameterSettings>, BTreeMap<ParName, PriorDist>)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| Error::InputSchema(format!("cannot read {}: {e}", path.display())))?;

    let headers = reader
        .headers()
        .map_err(|e| Error::InputSchema(format!("bad header row: {e}")))?
        .clone();
    let columns = column_indices(&headers);
    let col = |name: &str| -> Result<usize> {
        columns.get(name).copied().ok_or_else(|| {
            print_parameter_schema_help();
            Error::InputSchema(format!("parameter file is missing column `{name}`"))
        })
    };

    let name_col = col("name")?;
    let init_col = col("initialValue")?;
    let prior_mean_col = col("priorMean")?;
    let prior_sd_col = col("priorSD")?;
    let prior_dist_col = col("priorDist")?;
    let variance_col = columns.get("samplerVariance").copied();
    let constant_col = columns.get("isConstant").copied();

    let mut inits = Vec::new();
    let mut priors = BTreeMap::new();
    for (row, record) in reader.records().enumerate() {
        let line = row + 2; // header is line 1
        let record =
            record.map_err(|e| Error::InputSchema(format!("line {line}: {e}")))?;
        let field = |idx: usize| -> Result<&str> {
            record
                .get(idx)
                .ok_or_else(|| Error::InputSchema(format!("line {line}: short record")))
        };

        let name = field(name_col)?.to_string();
        let mut par = ParameterSettings::new(
            name.clone(),
            parse_field(field(init_col)?, "initialValue", line)?,
        );
        if let Some(idx) = variance_col {
            let raw = field(idx)?;
            if !raw.is_empty() {
                par = par.with_variance(parse_field(raw, "samplerVariance", line)?);
            }
        }
        if let Some(idx) = constant_col {
            if parse_flag(field(idx)?, "isConstant", line)? {
                par = par.constant();
            }
        }
        inits.push(par);

        let family_raw = field(prior_dist_col)?;
        let family = PriorFamily::parse(family_raw).ok_or_else(|| {
            Error::InputSchema(format!(
                "line {line}: unknown prior family `{family_raw}` (expected Normal or Cauchy)"
            ))
        })?;
        priors.insert(
            name,
            PriorDist::new(
                parse_field(field(prior_mean_col)?, "priorMean", line)?,
                parse_field(field(prior_sd_col)?, "priorSD", line)?,
                family,
            ),
        );
    }
    Ok((inits, priors))
}

/// Read the transition file against a chosen model.
///
/// Prevalence columns are named `prevalence<state>`; at most one may be
/// absent and is then inferred as one minus the sum of the others.
pub fn read_transitions(
    path: &Path,
    model: &TransitionModel,
    prevalence_model: PrevalenceModel,
) -> Result<Vec<Transition>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| Error::InputSchema(format!("cannot read {}: {e}", path.display())))?;

    let headers = reader
        .headers()
        .map_err(|e| Error::InputSchema(format!("bad header row: {e}")))?
        .clone();
    let columns = column_indices(&headers);
    let col = |name: &str| -> Result<usize> {
        columns.get(name).copied().ok_or_else(|| {
            print_transition_schema_help(model);
            Error::InputSchema(format!("transition file is missing column `{name}`"))
        })
    };

    let initial_col = col("initial")?;
    let final_col = col("final")?;
    let env1_col = col("env1")?;
    let env2_col = col("env2")?;
    let interval_col = col("interval")?;

    let mut prevalence_cols = Vec::new();
    let mut inferred_state = None;
    for &state in model.alphabet() {
        match columns.get(format!("prevalence{state}").as_str()) {
            Some(&idx) => prevalence_cols.push((state, idx)),
            None if inferred_state.is_none() => inferred_state = Some(state),
            None => {
                print_transition_schema_help(model);
                return Err(Error::InputSchema(format!(
                    "transition file needs at least {} prevalence columns",
                    model.alphabet().len() - 1
                )));
            }
        }
    }

    let mut transitions = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let line = row + 2;
        let record =
            record.map_err(|e| Error::InputSchema(format!("line {line}: {e}")))?;
        let field = |idx: usize| -> Result<&str> {
            record
                .get(idx)
                .ok_or_else(|| Error::InputSchema(format!("line {line}: short record")))
        };

        let mut expected = StateMap::new();
        let mut total = 0.0;
        for &(state, idx) in &prevalence_cols {
            let value: f64 = parse_field(field(idx)?, "prevalence", line)?;
            total += value;
            expected.insert(state, value);
        }
        if let Some(state) = inferred_state {
            expected.insert(state, 1.0 - total);
        }

        let transition = Transition::new(
            model,
            parse_state_char(field(initial_col)?, "initial", line)?,
            parse_state_char(field(final_col)?, "final", line)?,
            parse_field(field(env1_col)?, "env1", line)?,
            parse_field(field(env2_col)?, "env2", line)?,
            expected,
            parse_field(field(interval_col)?, "interval", line)?,
            prevalence_model,
        )
        .map_err(|e| match e {
            Error::InvalidTransition(msg) => {
                Error::InvalidTransition(format!("line {line}: {msg}"))
            }
            other => other,
        })?;
        transitions.push(transition);
    }
    Ok(transitions)
}

fn column_indices(headers: &csv::StringRecord) -> BTreeMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().trim_matches('"').to_string(), i))
        .collect()
}

fn parse_field<T: FromStr>(raw: &str, what: &str, line: usize) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::InputSchema(format!("line {line}: cannot parse {what} `{raw}`")))
}

fn parse_flag(raw: &str, what: &str, line: usize) -> Result<bool> {
    match raw {
        "1" | "true" | "TRUE" => Ok(true),
        "0" | "false" | "FALSE" | "" => Ok(false),
        _ => Err(Error::InputSchema(format!(
            "line {line}: cannot parse {what} `{raw}`"
        ))),
    }
}

fn parse_state_char(raw: &str, what: &str, line: usize) -> Result<char> {
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(Error::InputSchema(format!(
            "line {line}: {what} must be a single state character, got `{raw}`"
        ))),
    }
}

fn print_parameter_schema_help() {
    eprintln!("The parameter file is comma-delimited with a header row; column names must match exactly.");
    eprintln!("    Required:");
    eprintln!("        name -- the name of the parameter (as used by the model)");
    eprintln!("        initialValue -- the starting value for the parameter");
    eprintln!("        priorMean -- the mean of the prior");
    eprintln!("        priorSD -- the standard deviation of the prior");
    eprintln!("        priorDist -- prior family, Normal or Cauchy");
    eprintln!("    Optional:");
    eprintln!("        samplerVariance -- proposal scale for tuning the sampler");
    eprintln!("        isConstant -- 1 to hold the parameter fixed");
}

fn print_transition_schema_help(model: &TransitionModel) {
    eprintln!("Each row of the transition file is one observed transition within a plot.");
    eprintln!("The file is comma-delimited with a header row; column names must match exactly.");
    eprintln!("        initial -- the initial state of the plot");
    eprintln!("        final -- the final state of the plot");
    eprintln!("        env1 -- the first environmental variable");
    eprintln!("        env2 -- the second environmental variable");
    eprintln!("        interval -- number of years between the two samples");
    for state in model.alphabet() {
        eprintln!("        prevalence{state} -- the expected prevalence of the {state} state");
    }
    eprintln!("One prevalence column may be omitted; it is inferred from the others.");
}
