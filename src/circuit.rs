//! Jerez circuit layout
//!
//! The synthetic lap is 10 s long: six corners followed by a short straight.
//! Each corner carries a target apex speed, a peak lateral load and a radius.
//! The windows are lap-local; [`segment_at`] wraps any time into the lap.
//!
//! Aerodynamic load uses the textbook `F = ½·ρ·v²·C·A` with fixed
//! coefficients for a MotoGP fairing.

/// Length of one synthetic lap (s)
pub const LAP_DURATION_S: f64 = 10.0;

/// Air density at sea level (kg/m³)
pub const AIR_DENSITY: f64 = 1.225;

/// Downforce coefficient
pub const DOWNFORCE_COEFFICIENT: f64 = 1.2;

/// Frontal area (m²)
pub const FRONTAL_AREA_M2: f64 = 0.45;

/// Static descriptor of one corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Turn {
    /// Short key used in tables (`Turn1`..`Turn6`)
    pub key: &'static str,
    /// Corner name
    pub name: &'static str,
    /// Target apex speed (km/h)
    pub speed_kmh: f64,
    /// Peak lateral load (g)
    pub lateral_g: f64,
    /// Corner radius (m)
    pub radius_m: f64,
    /// Window start within the lap (s, inclusive)
    pub start_s: f64,
    /// Window end within the lap (s, exclusive)
    pub end_s: f64,
}

impl Turn {
    /// Window length (s)
    #[must_use]
    pub fn duration_s(&self) -> f64 {
        self.end_s - self.start_s
    }
}

/// The six corners in lap order.
pub const TURNS: [Turn; 6] = [
    Turn {
        key: "Turn1",
        name: "Senna",
        speed_kmh: 95.0,
        lateral_g: 1.2,
        radius_m: 350.0,
        start_s: 0.0,
        end_s: 1.2,
    },
    Turn {
        key: "Turn2",
        name: "Dry Sack",
        speed_kmh: 180.0,
        lateral_g: 1.8,
        radius_m: 800.0,
        start_s: 1.2,
        end_s: 3.2,
    },
    Turn {
        key: "Turn3",
        name: "Ciklon",
        speed_kmh: 125.0,
        lateral_g: 1.5,
        radius_m: 400.0,
        start_s: 3.2,
        end_s: 4.7,
    },
    Turn {
        key: "Turn4",
        name: "Cartuja",
        speed_kmh: 160.0,
        lateral_g: 1.6,
        radius_m: 600.0,
        start_s: 4.7,
        end_s: 6.5,
    },
    Turn {
        key: "Turn5",
        name: "Ayrton",
        speed_kmh: 145.0,
        lateral_g: 1.4,
        radius_m: 500.0,
        start_s: 6.5,
        end_s: 8.2,
    },
    Turn {
        key: "Turn6",
        name: "Giro",
        speed_kmh: 110.0,
        lateral_g: 1.3,
        radius_m: 380.0,
        start_s: 8.2,
        end_s: 9.5,
    },
];

/// Start of the closing straight (s)
pub const STRAIGHT_START_S: f64 = 9.5;

/// Part of the lap a sample falls into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment {
    /// Inside a corner window
    Corner(&'static Turn),
    /// On the closing straight
    Straight,
}

impl Segment {
    /// Table key (`Turn1`..`Turn6`, `Straight`)
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Corner(turn) => turn.key,
            Self::Straight => "Straight",
        }
    }

    /// Display name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Corner(turn) => turn.name,
            Self::Straight => "Straight",
        }
    }

    /// Lap-local window `[start, end)`
    #[must_use]
    pub const fn window(&self) -> (f64, f64) {
        match self {
            Self::Corner(turn) => (turn.start_s, turn.end_s),
            Self::Straight => (STRAIGHT_START_S, LAP_DURATION_S),
        }
    }
}

/// Locate a lap time and return its segment with phase `u ∈ [0, 1)`.
///
/// Times outside `[0, LAP_DURATION_S)` are wrapped into the lap first.
#[must_use]
pub fn segment_at(lap_time_s: f64) -> (Segment, f64) {
    let t = lap_time_s.rem_euclid(LAP_DURATION_S);
    for turn in &TURNS {
        if t >= turn.start_s && t < turn.end_s {
            let u = (t - turn.start_s) / turn.duration_s();
            return (Segment::Corner(turn), u.clamp(0.0, 1.0 - f64::EPSILON));
        }
    }
    let u = (t - STRAIGHT_START_S) / (LAP_DURATION_S - STRAIGHT_START_S);
    (Segment::Straight, u.clamp(0.0, 1.0 - f64::EPSILON))
}

/// Segment of the `k`-th sample of a lap sampled `lap_samples` times.
///
/// Time is scaled onto the 10 s layout, so any lap duration maps onto the
/// same corners.
#[must_use]
pub fn segment_of_sample(k: usize, lap_samples: usize) -> (Segment, f64) {
    #[allow(clippy::cast_precision_loss)]
    let lap_time = (k % lap_samples.max(1)) as f64 * LAP_DURATION_S / lap_samples.max(1) as f64;
    segment_at(lap_time)
}

/// All seven segments in lap order.
#[must_use]
pub fn segment_windows() -> Vec<Segment> {
    TURNS
        .iter()
        .map(Segment::Corner)
        .chain(std::iter::once(Segment::Straight))
        .collect()
}

/// Aerodynamic `(downforce_n, drag_n)` at a given speed.
#[must_use]
pub fn aero_load(speed_kmh: f64) -> (f64, f64) {
    let v = speed_kmh / 3.6;
    let downforce = 0.5 * AIR_DENSITY * v * v * DOWNFORCE_COEFFICIENT * FRONTAL_AREA_M2;
    (downforce, downforce * 0.5)
}
