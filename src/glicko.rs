//! Reference Glicko rating simulation
//!
//! A self-contained demonstration of the Glicko-1 update and a simple motor
//! torque model. Nothing here feeds the σ telemetry channel; the outputs
//! land in `glicko/` as reference material next to the study.
//!
//! [`GlickoRun::export`] adds the combined `sample_data.csv` and the motor
//! sweep as `simulation_data.mf4`.
//!
//! References:
//! - Glickman (1999): Parameter estimation in large dynamic paired
//!   comparison experiments
//! - Glickman: The Glicko system (worked example, r = 1500, RD = 200)

use crate::config::GlickoConfig;
use crate::mdf4::{write_groups, ChannelSpec, GroupData, Mdf4Header};
use crate::storage::write_rows;
use crate::Result;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::f64::consts::{LN_10, PI};
use std::path::{Path, PathBuf};
use tracing::info;

/// Scale constant `q = ln 10 / 400`
pub const Q: f64 = LN_10 / 400.0;
/// Lower bound of the rating deviation
pub const MIN_RD: f64 = 30.0;
/// Upper bound of the rating deviation
pub const MAX_RD: f64 = 350.0;

/// Ratings history file name
pub const RATINGS_FILE: &str = "glicko_ratings_data.csv";
/// Motor sweep file name
pub const MOTOR_FILE: &str = "motor_physics_data.csv";
/// Combined sample file name
pub const SAMPLE_FILE: &str = "sample_data.csv";
/// Motor sweep MDF4 file name
pub const SIMULATION_MDF4_FILE: &str = "simulation_data.mf4";
/// Rows of each kind in the combined sample
pub const SAMPLE_ROWS: usize = 10;
/// Motor sweep step (s)
pub const SWEEP_STEP_S: f64 = 0.1;
/// Motor sweep length (s)
pub const SWEEP_DURATION_S: f64 = 10.0;

/// Result of one game from the rated player's side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    /// Opponent rating
    pub opponent_rating: f64,
    /// Opponent rating deviation
    pub opponent_rd: f64,
    /// 1 win, 0.5 draw, 0 loss
    pub score: f64,
}

/// Glicko-1 rating system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlickoSystem {
    /// Rating of a new player
    pub initial_rating: f64,
    /// Rating deviation of a new player
    pub initial_rd: f64,
}

impl Default for GlickoSystem {
    fn default() -> Self {
        Self {
            initial_rating: 1500.0,
            initial_rd: MAX_RD,
        }
    }
}

/// Attenuation of an opponent's influence by their uncertainty
#[must_use]
pub fn g(rd: f64) -> f64 {
    1.0 / (1.0 + 3.0 * Q * Q * rd * rd / (PI * PI)).sqrt()
}

/// Expected score of `rating` against an opponent
#[must_use]
pub fn expected_score(rating: f64, opponent_rating: f64, opponent_rd: f64) -> f64 {
    1.0 / (1.0 + 10_f64.powf(-g(opponent_rd) * (rating - opponent_rating) / 400.0))
}

impl GlickoSystem {
    /// System with the given starting values
    #[must_use]
    pub const fn new(initial_rating: f64, initial_rd: f64) -> Self {
        Self {
            initial_rating,
            initial_rd,
        }
    }

    /// Rate one period of games; returns `(rating', rd')`.
    ///
    /// No games, or games carrying no information, leave the inputs
    /// unchanged. The new deviation is clamped to `[MIN_RD, MAX_RD]`.
    #[must_use]
    pub fn update(&self, rating: f64, rd: f64, outcomes: &[Outcome]) -> (f64, f64) {
        if outcomes.is_empty() {
            return (rating, rd);
        }

        let d2_inv = Q * Q
            * outcomes
                .iter()
                .map(|o| {
                    let e = expected_score(rating, o.opponent_rating, o.opponent_rd);
                    g(o.opponent_rd).powi(2) * e * (1.0 - e)
                })
                .sum::<f64>();
        if d2_inv == 0.0 {
            return (rating, rd);
        }

        let precision = 1.0 / (rd * rd) + d2_inv;
        let delta: f64 = outcomes
            .iter()
            .map(|o| {
                let e = expected_score(rating, o.opponent_rating, o.opponent_rd);
                g(o.opponent_rd) * (o.score - e)
            })
            .sum();
        let new_rating = rating + Q / precision * delta;
        let new_rd = (1.0 / precision).sqrt().clamp(MIN_RD, MAX_RD);
        (new_rating, new_rd)
    }

    /// Random pairings for `rounds` rounds among `players` players.
    ///
    /// Each round shuffles the field and pairs neighbours; with an odd
    /// field the last player sits out. Player 1 wins when the draw falls
    /// below `E − 0.1`, loses above `E + 0.1`, and draws otherwise.
    /// Rows carry the rating before the game and the tallies after it.
    pub fn simulate_tournament<R: Rng>(
        &self,
        players: usize,
        rounds: usize,
        rng: &mut R,
    ) -> Vec<MatchRecord> {
        let mut field: Vec<PlayerState> = (0..players)
            .map(|id| PlayerState {
                id,
                rating: self.initial_rating,
                rd: self.initial_rd,
                wins: 0,
                losses: 0,
                draws: 0,
            })
            .collect();
        let mut order: Vec<usize> = (0..players).collect();
        let mut history = Vec::with_capacity(rounds * players);

        for round in 1..=rounds {
            order.shuffle(rng);
            for pair in order.chunks_exact(2) {
                let (a, b) = (pair[0], pair[1]);
                let expected = expected_score(field[a].rating, field[b].rating, field[b].rd);
                let draw: f64 = rng.gen();
                let score = if draw < expected - 0.1 {
                    1.0
                } else if draw > expected + 0.1 {
                    0.0
                } else {
                    0.5
                };

                field[a].tally(score);
                field[b].tally(1.0 - score);
                let new_a = self.update(
                    field[a].rating,
                    field[a].rd,
                    &[field[b].outcome(score)],
                );
                let new_b = self.update(
                    field[b].rating,
                    field[b].rd,
                    &[field[a].outcome(1.0 - score)],
                );

                history.push(field[a].record(round, field[b].id, score));
                history.push(field[b].record(round, field[a].id, 1.0 - score));
                (field[a].rating, field[a].rd) = new_a;
                (field[b].rating, field[b].rd) = new_b;
            }
        }
        history
    }
}

#[derive(Debug, Clone)]
struct PlayerState {
    id: usize,
    rating: f64,
    rd: f64,
    wins: u32,
    losses: u32,
    draws: u32,
}

impl PlayerState {
    fn tally(&mut self, score: f64) {
        if score > 0.5 {
            self.wins += 1;
        } else if score < 0.5 {
            self.losses += 1;
        } else {
            self.draws += 1;
        }
    }

    /// Outcome as seen by this player's opponent, who scored `score`
    const fn outcome(&self, score: f64) -> Outcome {
        Outcome {
            opponent_rating: self.rating,
            opponent_rd: self.rd,
            score,
        }
    }

    fn record(&self, round: usize, opponent_id: usize, score: f64) -> MatchRecord {
        MatchRecord {
            round,
            player_id: self.id,
            player_name: format!("Player_{}", self.id),
            rating: round2(self.rating),
            rd: round2(self.rd),
            opponent_id,
            score,
            wins: self.wins,
            losses: self.losses,
            draws: self.draws,
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// One row of the ratings history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchRecord {
    /// Round number (1-based)
    pub round: usize,
    /// Player id
    pub player_id: usize,
    /// Player name
    pub player_name: String,
    /// Rating before the game
    pub rating: f64,
    /// Rating deviation before the game
    pub rd: f64,
    /// Opponent id
    pub opponent_id: usize,
    /// Score of this player
    pub score: f64,
    /// Wins so far
    pub wins: u32,
    /// Losses so far
    pub losses: u32,
    /// Draws so far
    pub draws: u32,
}

/// Torque curve and acceleration sweep of a reference motor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorModel {
    /// Redline (rpm)
    pub max_rpm: f64,
    /// Peak torque (Nm)
    pub max_torque: f64,
}

impl Default for MotorModel {
    fn default() -> Self {
        Self {
            max_rpm: 6000.0,
            max_torque: 250.0,
        }
    }
}

/// One point of the acceleration sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MotorSample {
    /// Time (s)
    pub time: f64,
    /// Engine speed (rpm)
    pub rpm: f64,
    /// Torque (Nm)
    pub torque: f64,
    /// Power (kW)
    pub power_kw: f64,
}

impl MotorModel {
    /// Torque at `rpm`; zero outside `[0, max_rpm]`.
    #[must_use]
    pub fn torque(&self, rpm: f64) -> f64 {
        if !(0.0..=self.max_rpm).contains(&rpm) {
            return 0.0;
        }
        let n = rpm / self.max_rpm;
        let shape = 0.3 + 0.7 * (PI * n).sin() * (-(n - 0.5).powi(2) / 0.3).exp();
        (self.max_torque * shape).max(0.0)
    }

    /// Power (kW) from torque (Nm) and engine speed (rpm)
    #[must_use]
    pub fn power_kw(torque: f64, rpm: f64) -> f64 {
        if rpm <= 0.0 {
            0.0
        } else {
            torque * rpm / 9549.0
        }
    }

    /// Exponential run-up `rpm = max·(1 − e^(−t/3))` sampled every `step` s.
    #[must_use]
    pub fn acceleration_sweep(&self, duration_s: f64, step_s: f64) -> Vec<MotorSample> {
        if step_s <= 0.0 || duration_s < 0.0 {
            return Vec::new();
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let steps = (duration_s / step_s + 1e-9).floor() as usize;
        (0..=steps)
            .map(|k| {
                #[allow(clippy::cast_precision_loss)]
                let time = k as f64 * step_s;
                let rpm = self.max_rpm * (1.0 - (-time / 3.0).exp());
                let torque = self.torque(rpm);
                MotorSample {
                    time: round2(time),
                    rpm: round2(rpm),
                    torque: round2(torque),
                    power_kw: round2(Self::power_kw(torque, rpm)),
                }
            })
            .collect()
    }
}

/// Paths and row counts of a reference run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlickoOutputs {
    /// Ratings history CSV
    pub ratings_csv: PathBuf,
    /// Motor sweep CSV
    pub motor_csv: PathBuf,
    /// Rows in the ratings history
    pub matches: usize,
    /// Rows in the motor sweep
    pub motor_samples: usize,
}

/// Paths of the combined sample and MDF4 export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlickoExport {
    /// Combined sample CSV
    pub sample_csv: PathBuf,
    /// Motor sweep MDF4
    pub mdf4: PathBuf,
    /// Rows in the combined sample
    pub sample_rows: usize,
    /// MDF4 size in bytes
    pub mdf4_bytes: u64,
}

/// One row of the combined sample: three values with their labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRow {
    /// Sweep time (s) for motor rows, row index for rating rows
    pub timestamp: f64,
    /// `motor_physics` or `glicko_rating`
    pub data_type: &'static str,
    /// First value
    pub value1: f64,
    /// Second value
    pub value2: f64,
    /// Third value
    pub value3: f64,
    /// Label of `value1`
    pub label1: &'static str,
    /// Label of `value2`
    pub label2: &'static str,
    /// Label of `value3`
    pub label3: &'static str,
}

/// First [`SAMPLE_ROWS`] motor points followed by the first
/// [`SAMPLE_ROWS`] rating records.
#[must_use]
pub fn sample_rows(sweep: &[MotorSample], history: &[MatchRecord]) -> Vec<SampleRow> {
    let motor = sweep.iter().take(SAMPLE_ROWS).enumerate().map(|(i, m)| {
        #[allow(clippy::cast_precision_loss)]
        let timestamp = round2(i as f64 * SWEEP_STEP_S);
        SampleRow {
            timestamp,
            data_type: "motor_physics",
            value1: m.rpm,
            value2: m.torque,
            value3: m.power_kw,
            label1: "RPM",
            label2: "Torque(Nm)",
            label3: "Power(kW)",
        }
    });
    let ratings = history.iter().take(SAMPLE_ROWS).enumerate().map(|(i, r)| {
        #[allow(clippy::cast_precision_loss)]
        let timestamp = i as f64;
        SampleRow {
            timestamp,
            data_type: "glicko_rating",
            value1: r.rating,
            value2: r.rd,
            value3: r.score,
            label1: "Rating",
            label2: "RD",
            label3: "Score",
        }
    });
    motor.chain(ratings).collect()
}

const fn motor_channel(
    name: &'static str,
    unit: &'static str,
    comment: &'static str,
    master: bool,
) -> ChannelSpec<'static> {
    ChannelSpec {
        name,
        unit,
        comment,
        master,
        limits: None,
    }
}

/// Tournament history and motor sweep of one reference run.
#[derive(Debug, Clone, PartialEq)]
pub struct GlickoRun {
    /// Ratings history
    pub history: Vec<MatchRecord>,
    /// Motor acceleration sweep
    pub sweep: Vec<MotorSample>,
}

impl GlickoRun {
    /// Run the tournament and the default motor sweep.
    pub fn simulate<R: Rng>(config: &GlickoConfig, rng: &mut R) -> Self {
        let system = GlickoSystem::new(config.initial_rating, config.initial_rd);
        Self {
            history: system.simulate_tournament(config.players, config.rounds, rng),
            sweep: MotorModel::default().acceleration_sweep(SWEEP_DURATION_S, SWEEP_STEP_S),
        }
    }

    /// Write the ratings history and the motor sweep CSVs into `dir`.
    ///
    /// # Errors
    ///
    /// Returns error if `dir` or a file cannot be written.
    pub fn write_csv(&self, dir: &Path) -> Result<GlickoOutputs> {
        let outputs = GlickoOutputs {
            ratings_csv: write_rows(dir.join(RATINGS_FILE), &self.history)?,
            motor_csv: write_rows(dir.join(MOTOR_FILE), &self.sweep)?,
            matches: self.history.len(),
            motor_samples: self.sweep.len(),
        };
        info!(
            matches = outputs.matches,
            motor_samples = outputs.motor_samples,
            "Glicko reference simulation written"
        );
        Ok(outputs)
    }

    /// Sweep columns: time, rpm, torque, power.
    #[must_use]
    pub fn motor_columns(&self) -> [Vec<f64>; 4] {
        let column =
            |f: fn(&MotorSample) -> f64| -> Vec<f64> { self.sweep.iter().map(f).collect() };
        [
            column(|m| m.time),
            column(|m| m.rpm),
            column(|m| m.torque),
            column(|m| m.power_kw),
        ]
    }

    /// Write `sample_data.csv` and the motor sweep as `simulation_data.mf4`.
    ///
    /// # Errors
    ///
    /// Returns error if a file cannot be written or the MDF4 encoding fails.
    pub fn export(&self, dir: &Path, header: &Mdf4Header) -> Result<GlickoExport> {
        let samples = sample_rows(&self.sweep, &self.history);
        let sample_csv = write_rows(dir.join(SAMPLE_FILE), &samples)?;

        let [time, rpm, torque, power] = self.motor_columns();
        let group = GroupData {
            acquisition: "motor_physics",
            channels: vec![
                motor_channel("time", "s", "Sweep time", true),
                motor_channel("RPM", "rpm", "Motor speed", false),
                motor_channel("Torque", "Nm", "Motor torque", false),
                motor_channel("Power", "kW", "Mechanical power", false),
            ],
            columns: vec![
                time.as_slice(),
                rpm.as_slice(),
                torque.as_slice(),
                power.as_slice(),
            ],
        };
        let mdf4 = dir.join(SIMULATION_MDF4_FILE);
        let mdf4_bytes = write_groups(&[group], header, &mdf4)?;
        info!(
            samples = samples.len(),
            mdf4 = %mdf4.display(),
            "Glicko reference export written"
        );
        Ok(GlickoExport {
            sample_csv,
            mdf4,
            sample_rows: samples.len(),
            mdf4_bytes,
        })
    }
}
