//! Seeded telemetry generator
//!
//! One `StdRng` drives the whole dataset: the baseline frame is drawn first,
//! then the optimized frame continues the same stream. Every sample consumes
//! its noise in a fixed order, so a seed maps to exactly one dataset.
//!
//! Per sample:
//! 1. Circuit profile (throttle, speed, rpm, gear, lon/lat g) from the
//!    segment the lap-local time falls into
//! 2. Setup multipliers on rpm, throttle and lateral g, then clipping
//! 3. Derived channels (brakes, chassis, tires, IMU, aero, σ, efficiency,
//!    electrical)

use super::{volatility, Channel, Setup, SetupModifiers, TelemetryDataset, TelemetryFrame};
use crate::circuit::{self, Segment};
use crate::config::StudyConfig;
use crate::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::f64::consts::PI;
use tracing::{debug, info};

/// Gaussian noise source over a shared RNG stream.
pub struct Noise<'a> {
    rng: &'a mut StdRng,
}

impl<'a> Noise<'a> {
    /// Wrap an RNG
    pub fn new(rng: &'a mut StdRng) -> Self {
        Self { rng }
    }

    /// Draw from `N(0, std²)`
    pub fn gauss(&mut self, std: f64) -> f64 {
        let z: f64 = self.rng.sample(StandardNormal);
        z * std
    }

    /// Draw from `N(mean, std²)`
    pub fn normal(&mut self, mean: f64, std: f64) -> f64 {
        mean + self.gauss(std)
    }
}

/// Circuit profile of one sample before setup multipliers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Profile {
    /// Throttle position (0..1)
    pub throttle: f64,
    /// Speed (km/h)
    pub speed: f64,
    /// Engine speed (rpm)
    pub rpm: f64,
    /// Gear (2..6)
    pub gear: f64,
    /// Longitudinal acceleration (g)
    pub lon: f64,
    /// Lateral acceleration (g)
    pub lat: f64,
}

/// Profile of a segment at phase `u`.
///
/// Corners draw one noise value (rpm); the straight draws five.
pub fn profile(segment: Segment, u: f64, noise: &mut Noise<'_>) -> Profile {
    match segment {
        Segment::Corner(turn) => {
            let throttle = if u < 0.3 {
                0.2
            } else if u < 0.7 {
                0.4 + 0.1 * (2.0 * PI * u).sin()
            } else {
                0.7
            };
            let speed = (turn.speed_kmh + 10.0 * (PI * u).sin())
                .clamp(turn.speed_kmh - 20.0, 240.0);
            let rpm = Channel::EngineRpm.clip(8000.0 + 50.0 * speed + noise.gauss(50.0));
            Profile {
                throttle,
                speed,
                rpm,
                gear: Channel::Gear.clip((speed / 40.0).floor()),
                lon: 0.5 * (PI * u).cos(),
                lat: turn.lateral_g * (PI * u).sin(),
            }
        }
        Segment::Straight => Profile {
            throttle: noise.normal(0.9, 0.01),
            speed: noise.normal(220.0, 1.0),
            rpm: noise.normal(17_500.0, 50.0),
            gear: 6.0,
            lon: noise.normal(0.8, 0.02),
            lat: noise.normal(0.1, 0.005),
        },
    }
}

/// Apply setup multipliers and clip the driver inputs.
#[must_use]
pub fn apply_setup(profile: Profile, modifiers: &SetupModifiers) -> Profile {
    Profile {
        rpm: Channel::EngineRpm.clip(profile.rpm * modifiers.rpm),
        throttle: Channel::Throttle.clip(profile.throttle * modifiers.throttle),
        lat: profile.lat * modifiers.lateral,
        ..profile
    }
}

/// Every channel of one sample, in [`Channel::ALL`] order.
///
/// `i` is the setup-local sample index; `time` is the continuous session time.
pub fn sample(
    p: &Profile,
    i: usize,
    time: f64,
    modifiers: &SetupModifiers,
    noise: &mut Noise<'_>,
) -> [f64; Channel::COUNT] {
    #[allow(clippy::cast_precision_loss)]
    let idx = i as f64;
    let thr = p.throttle;
    let lat = p.lat;
    let lon = p.lon;

    let brake_pressure = (1.0 - thr) * 120.0 + noise.gauss(1.0);
    let brake_temperature = 150.0 + 200.0 * (1.0 - thr) + noise.gauss(5.0);

    let tire_fl = 85.0 + 30.0 * lat.abs() + noise.gauss(1.5);
    let tire_fr = 84.0 + 32.0 * lat.abs() + noise.gauss(1.5);
    let tire_rl = 95.0 + 25.0 * lon.abs() + noise.gauss(1.2);
    let tire_rr = 94.0 + 27.0 * lon.abs() + noise.gauss(1.2);

    let press_fl = Channel::TirePressureFl.clip(2.05 + 0.002 * tire_fl + noise.gauss(5e-4));
    let press_fr = Channel::TirePressureFr.clip(2.04 + 0.002 * tire_fr + noise.gauss(5e-4));
    let press_rl = Channel::TirePressureRl.clip(2.10 + 0.002 * tire_rl + noise.gauss(6e-4));
    let press_rr = Channel::TirePressureRr.clip(2.11 + 0.002 * tire_rr + noise.gauss(6e-4));

    let slip = Channel::WheelSlip
        .clip((5.0 + 10.0 * thr + 8.0 * lat.abs() + noise.gauss(0.5)) * modifiers.slip);

    let roll = 8.0 * sign(lat) * lat.abs().powf(0.8) + noise.gauss(0.2);
    let yaw = 5.0 * lat.abs() + noise.gauss(0.1);

    let (downforce, drag) = circuit::aero_load(p.speed);
    let sigma = volatility::sigma(lat, lon, thr, noise.gauss(volatility::NOISE_STD), modifiers);

    let gear_ratio_eff = 88.0 + 8.0 * (2.0 * PI * p.gear / 6.0).sin() + noise.gauss(0.5);
    let rpm_phase = (2.0 * PI * p.rpm / 18_500.0).sin();
    let engine_eff = Channel::EngineEfficiency.clip(
        92.0 + 5.0 * rpm_phase - slip / 10.0 + modifiers.efficiency_offset,
    );

    let suspension = |offset: f64, amp: f64, phase: f64| {
        offset + amp * (2.0 * PI * idx / 500.0 + phase).sin()
    };

    [
        time,
        p.rpm,
        160.0 + 20.0 * (p.rpm / 1000.0).sin(),
        thr,
        p.gear,
        p.speed,
        lon,
        lat,
        slip,
        brake_pressure,
        brake_temperature,
        55.0 + 5.0 * (2.0 * PI * idx / 1000.0).sin(),
        suspension(18.0, 5.0, 0.0),
        suspension(17.0, 5.0, 0.3),
        suspension(22.0, 4.0, 0.0),
        suspension(23.0, 4.0, 0.3),
        tire_fl,
        tire_fr,
        tire_rl,
        tire_rr,
        press_fl,
        press_fr,
        press_rl,
        press_rr,
        0.5 * (2.0 * PI * idx / 2000.0).sin(),
        roll,
        3.0 * (2.0 * PI * idx / 1000.0).sin(),
        yaw,
        downforce,
        drag,
        sigma,
        gear_ratio_eff,
        engine_eff,
        14.0 + rpm_phase - 0.5 * thr,
        5.0 + 20.0 * thr + 10.0 * lat.abs(),
    ]
}

/// Sign with `sign(0) == 0`, unlike `f64::signum`.
fn sign(x: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x.signum()
    }
}

/// Generate the frame of one setup, continuing the caller's RNG stream.
///
/// # Errors
///
/// Returns error if the configuration is invalid.
pub fn generate_frame(
    config: &StudyConfig,
    setup: Setup,
    rng: &mut StdRng,
) -> Result<TelemetryFrame> {
    config.validate()?;
    let lap_samples = config.samples_per_lap();
    let n = config.samples_per_setup();
    let laps_per_setup = config.laps_per_setup;
    let fs = f64::from(config.sample_rate_hz);
    let modifiers = setup.modifiers();
    let (sample_offset, lap_offset) = match setup {
        Setup::Baseline => (0, 0),
        Setup::Optimized => (n, laps_per_setup),
    };

    let mut columns: Vec<Vec<f64>> = (0..Channel::COUNT).map(|_| Vec::with_capacity(n)).collect();
    let mut laps = Vec::with_capacity(n);
    let mut noise = Noise::new(rng);

    #[allow(clippy::cast_precision_loss)]
    for i in 0..n {
        let (segment, u) = circuit::segment_of_sample(i, lap_samples);
        let p = apply_setup(profile(segment, u, &mut noise), &modifiers);
        let time = (sample_offset + i) as f64 / fs;
        let values = sample(&p, i, time, &modifiers, &mut noise);
        for (col, v) in columns.iter_mut().zip(values) {
            col.push(v);
        }
        #[allow(clippy::cast_possible_truncation)]
        laps.push(lap_offset + (i / lap_samples) as u32);
    }

    debug!(setup = %setup, samples = n, "frame generated");
    TelemetryFrame::new(setup, columns, laps)
}

/// Generate the full two-setup dataset from `config.seed`.
///
/// # Errors
///
/// Returns error if the configuration is invalid.
pub fn generate_dataset(config: &StudyConfig) -> Result<TelemetryDataset> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let baseline = generate_frame(config, Setup::Baseline, &mut rng)?;
    let optimized = generate_frame(config, Setup::Optimized, &mut rng)?;
    let dataset = TelemetryDataset::new(baseline, optimized)?;
    info!(
        seed = config.seed,
        rows = dataset.rows(),
        channels = Channel::COUNT,
        "telemetry dataset generated"
    );
    Ok(dataset)
}
