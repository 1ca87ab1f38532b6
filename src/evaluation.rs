//! Greedy evaluation passes and single-episode traces.

use std::fmt;

use crate::agent::DoubleDqnAgent;
use crate::environment::{FeatureAcquisitionEnv, StateEncoder};
use crate::error::{AcquisitionError, Result};
use crate::metrics::{ConfusionMatrix, EvaluationReport};
use crate::predictor::Predictor;
use crate::qfunction::QFunction;
use crate::types::Mode;

/// Runs one greedy episode for every instance of the `mode` partition.
///
/// No transitions are stored and no parameters move. An episode whose budget
/// runs out without a guess is closed with a forced guess before scoring.
pub fn evaluate<P, E, Q>(
    env: &mut FeatureAcquisitionEnv<P, E>,
    agent: &mut DoubleDqnAgent<Q>,
    mode: Mode,
) -> Result<EvaluationReport>
where
    P: Predictor,
    E: StateEncoder,
    Q: QFunction,
{
    if mode.is_training() {
        return Err(AcquisitionError::InvalidConfig(
            "evaluation runs on the validation or test partition".into(),
        ));
    }
    let n = env.dataset().partition(mode).len();
    if n == 0 {
        tracing::warn!(%mode, "evaluation partition is empty");
    }

    let mut confusion = ConfusionMatrix::new(env.dataset().n_classes());
    let mut total_steps = 0;
    let mut forced_guesses = 0;
    for index in 0..n {
        let mut ctx = env.reset(mode, index)?;
        while !ctx.is_done() {
            let action = agent.select_action(ctx.state(), 0.0, ctx.mask(), mode)?;
            env.step(&mut ctx, action)?;
        }
        if ctx.guess().is_none() {
            env.force_guess(&mut ctx)?;
            forced_guesses += 1;
        }
        if let Some(class) = ctx.guess() {
            confusion.record(ctx.label(), class);
        }
        total_steps += ctx.steps();
    }

    Ok(EvaluationReport {
        mode,
        episodes: n,
        accuracy: confusion.accuracy(),
        average_steps: if n == 0 {
            0.0
        } else {
            total_steps as f64 / n as f64
        },
        forced_guesses,
        confusion,
    })
}

/// One step of a recorded episode.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceStep {
    Query {
        step: usize,
        feature: usize,
        name: Option<String>,
        value: f64,
    },
    Guess {
        step: usize,
        class: usize,
        /// Predicted probability of `class`.
        probability: f64,
        truth: usize,
        /// The budget ran out and the guess was forced.
        forced: bool,
    },
}

/// The path the agent took through one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeTrace {
    pub mode: Mode,
    pub instance: usize,
    pub steps: Vec<TraceStep>,
}

impl EpisodeTrace {
    /// Features queried, in order.
    pub fn queried(&self) -> Vec<usize> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                TraceStep::Query { feature, .. } => Some(*feature),
                TraceStep::Guess { .. } => None,
            })
            .collect()
    }

    /// Returns `true` if the final guess matches the label.
    pub fn is_correct(&self) -> bool {
        matches!(
            self.steps.last(),
            Some(TraceStep::Guess { class, truth, .. }) if class == truth
        )
    }
}

impl fmt::Display for TraceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceStep::Query {
                step,
                feature,
                name,
                value,
            } => match name {
                Some(name) => write!(f, "step {step}: query {name} (#{feature}) = {value:.3}"),
                None => write!(f, "step {step}: query #{feature} = {value:.3}"),
            },
            TraceStep::Guess {
                step,
                class,
                probability,
                truth,
                forced,
            } => {
                write!(
                    f,
                    "step {step}: guess class {class} (p={probability:.3}), true class {truth}"
                )?;
                if *forced {
                    write!(f, " [forced]")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for EpisodeTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} instance {}:", self.mode, self.instance)?;
        for step in &self.steps {
            writeln!(f, "  {step}")?;
        }
        Ok(())
    }
}

/// Runs one greedy episode on `index` and records every step.
pub fn trace_episode<P, E, Q>(
    env: &mut FeatureAcquisitionEnv<P, E>,
    agent: &mut DoubleDqnAgent<Q>,
    mode: Mode,
    index: usize,
) -> Result<EpisodeTrace>
where
    P: Predictor,
    E: StateEncoder,
    Q: QFunction,
{
    let mut ctx = env.reset(mode, index)?;
    let mut steps = Vec::new();
    while !ctx.is_done() {
        let action = agent.select_action(ctx.state(), 0.0, ctx.mask(), mode)?;
        env.step(&mut ctx, action)?;
        if action < env.n_features() {
            let value = env.dataset().partition(mode).features[ctx.instance()][action];
            steps.push(TraceStep::Query {
                step: ctx.steps(),
                feature: action,
                name: env.dataset().feature_name(action).map(str::to_owned),
                value,
            });
        }
    }
    let forced = ctx.guess().is_none();
    if forced {
        env.force_guess(&mut ctx)?;
    }
    if let (Some(class), Some(probabilities)) = (ctx.guess(), ctx.probabilities()) {
        steps.push(TraceStep::Guess {
            step: ctx.steps(),
            class,
            probability: probabilities[class],
            truth: ctx.label(),
            forced,
        });
    }

    Ok(EpisodeTrace {
        mode,
        instance: ctx.instance(),
        steps,
    })
}
