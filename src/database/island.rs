// src/database/island.rs — Islands, score clusters and prompt construction

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::infra::config::DatabaseConfig;
use crate::program::{Function, Program};

/// Temperature-scaled softmax. Fails on non-finite logits or a non-positive
/// temperature.
pub fn softmax(logits: &[f64], temperature: f64) -> anyhow::Result<Vec<f64>> {
    if temperature <= 0.0 || !temperature.is_finite() {
        anyhow::bail!("softmax temperature must be positive, got {temperature}");
    }
    if let Some(bad) = logits.iter().find(|l| !l.is_finite()) {
        anyhow::bail!("softmax got a non-finite logit: {bad}");
    }
    let scaled: Vec<f64> = logits.iter().map(|l| l / temperature).collect();
    let max = scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scaled.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    Ok(exps.into_iter().map(|e| e / sum).collect())
}

/// Rename calls to `from` (e.g. recursion) into calls to `to`. Attribute
/// calls like `obj.from(...)` and longer identifiers are left alone.
pub fn rename_calls(code: &str, from: &str, to: &str) -> String {
    if from.is_empty() || !code.contains(from) {
        return code.to_string();
    }
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';

    let mut out = String::with_capacity(code.len());
    let mut rest = code;
    while let Some(pos) = rest.find(from) {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + from.len()..];

        let before_ok = !out.chars().next_back().is_some_and(|c| is_ident(c) || c == '.');
        let after_ok = !after.chars().next().is_some_and(is_ident);
        let is_call = after.trim_start().starts_with('(');

        if before_ok && after_ok && is_call {
            out.push_str(to);
        } else {
            out.push_str(from);
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

/// Functions that share one score. Shorter ones are more likely to be picked.
#[derive(Debug, Clone)]
pub struct Cluster {
    score: f64,
    functions: Vec<Function>,
    lengths: Vec<usize>,
}

impl Cluster {
    fn new(score: f64, function: Function) -> Self {
        let mut cluster = Self {
            score,
            functions: Vec::new(),
            lengths: Vec::new(),
        };
        cluster.push(function);
        cluster
    }

    fn push(&mut self, function: Function) {
        self.lengths.push(function.source_len());
        self.functions.push(function);
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> &Function {
        if self.functions.len() == 1 {
            return &self.functions[0];
        }
        let min = self.lengths.iter().copied().min().unwrap_or(0) as f64;
        let max = self.lengths.iter().copied().max().unwrap_or(0) as f64;
        let logits: Vec<f64> = self
            .lengths
            .iter()
            .map(|&l| -((l as f64 - min) / (max - min + 1e-6)))
            .collect();

        let idx = softmax(&logits, 1.0)
            .ok()
            .and_then(|probs| WeightedIndex::new(&probs).ok())
            .map(|dist| dist.sample(rng))
            .unwrap_or(0);
        &self.functions[idx]
    }
}

/// A sub-population evolving independently of the others.
#[derive(Debug, Clone)]
pub struct Island {
    template: Arc<Program>,
    function_name: String,
    functions_per_prompt: usize,
    temperature_init: f64,
    temperature_period: usize,
    /// Keyed by the score's bit pattern so equal scores share a cluster.
    clusters: BTreeMap<u64, Cluster>,
    num_programs: usize,
}

impl Island {
    pub fn new(template: Arc<Program>, function_name: String, config: &DatabaseConfig) -> Self {
        Self {
            template,
            function_name,
            functions_per_prompt: config.functions_per_prompt.max(1),
            temperature_init: config.cluster_sampling_temperature_init,
            temperature_period: config.cluster_sampling_temperature_period.max(1),
            clusters: BTreeMap::new(),
            num_programs: 0,
        }
    }

    pub fn register(&mut self, function: Function, score: f64) {
        match self.clusters.get_mut(&score.to_bits()) {
            Some(cluster) => cluster.push(function),
            None => {
                self.clusters
                    .insert(score.to_bits(), Cluster::new(score, function));
            }
        }
        self.num_programs += 1;
    }

    pub fn num_programs(&self) -> usize {
        self.num_programs
    }

    pub fn num_clusters(&self) -> usize {
        self.clusters.len()
    }

    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    /// Current cluster sampling temperature. Starts at the configured value
    /// and decays linearly to zero over each period, then restarts.
    pub fn temperature(&self) -> f64 {
        let period = self.temperature_period;
        self.temperature_init * (1.0 - (self.num_programs % period) as f64 / period as f64)
    }

    /// Build a prompt from up to `functions_per_prompt` clusters. Returns the
    /// prompt source and the version number the model is asked to write.
    pub fn get_prompt<R: Rng + ?Sized>(&self, rng: &mut R) -> anyhow::Result<(String, usize)> {
        let clusters: Vec<&Cluster> = self.clusters.values().collect();
        if clusters.is_empty() {
            anyhow::bail!("island has no programs to build a prompt from");
        }

        let scores: Vec<f64> = clusters.iter().map(|c| c.score).collect();
        let probs = softmax(&scores, self.temperature())?;
        let wanted = self.functions_per_prompt.min(clusters.len());
        let chosen = weighted_sample_without_replacement(&probs, wanted, rng);

        let mut implementations: Vec<(&Function, f64)> = chosen
            .into_iter()
            .map(|i| (clusters[i].sample(rng), clusters[i].score))
            .collect();
        implementations.sort_by(|a, b| a.1.total_cmp(&b.1));

        let functions: Vec<&Function> = implementations.into_iter().map(|(f, _)| f).collect();
        Ok((self.build_prompt(&functions), functions.len()))
    }

    /// Render prior versions `name_v0..name_v{n-1}` (worst to best) followed by
    /// the bare header of `name_v{n}`.
    pub fn build_prompt(&self, implementations: &[&Function]) -> String {
        let name = &self.function_name;
        let mut versioned = Vec::with_capacity(implementations.len() + 1);

        for (i, function) in implementations.iter().enumerate() {
            let new_name = format!("{name}_v{i}");
            let mut version = function.renamed(&new_name);
            if i >= 1 {
                version.docstring = Some(format!("Improved version of `{name}_v{}`.", i - 1));
            }
            version.body = rename_calls(&version.body, name, &new_name);
            versioned.push(version);
        }

        let next = implementations.len();
        if let Some(last) = implementations.last() {
            let mut header = last.renamed(format!("{name}_v{next}"));
            header.body = String::new();
            header.docstring = Some(format!("Improved version of `{name}_v{}`.", next - 1));
            versioned.push(header);
        }

        Program {
            preface: self.template.preface.clone(),
            functions: versioned,
        }
        .to_string()
    }

    /// Every stored function with its score.
    pub fn entries(&self) -> Vec<(Function, f64)> {
        self.clusters
            .values()
            .flat_map(|c| c.functions.iter().map(move |f| (f.clone(), c.score)))
            .collect()
    }
}

/// Draw `n` distinct indices. Indices whose probability underflowed to zero
/// are drawn uniformly once the weighted ones run out.
fn weighted_sample_without_replacement<R: Rng + ?Sized>(
    probs: &[f64],
    n: usize,
    rng: &mut R,
) -> Vec<usize> {
    let mut weights = probs.to_vec();
    let mut chosen = Vec::with_capacity(n);
    while chosen.len() < n {
        let idx = match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(rng),
            Err(_) => {
                let rest: Vec<usize> = (0..weights.len()).filter(|i| !chosen.contains(i)).collect();
                let Some(&i) = rest.choose(rng) else {
                    break;
                };
                i
            }
        };
        weights[idx] = 0.0;
        chosen.push(idx);
    }
    chosen
}
