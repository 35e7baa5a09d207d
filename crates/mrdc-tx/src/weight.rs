//! Weight normalization and logistics weight classes.

use std::fmt;
use std::sync::LazyLock;

use mrdc_core::FieldIssue;
use regex::Regex;

static SINGLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?|\.\d+)\s*([a-z]+)$").expect("static weight pattern")
});

static MULTIPACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s*x\s*(\d+(?:\.\d+)?|\.\d+)\s*([a-z]+)$").expect("static multipack pattern")
});

/// Grams per unit; liquids assume a density of 1
fn grams_per_unit(unit: &str) -> Option<f64> {
    match unit {
        "kg" | "kgs" => Some(1000.0),
        "g" | "gr" | "grams" => Some(1.0),
        "l" => Some(1000.0),
        "ml" => Some(1.0),
        "oz" => Some(28.3495),
        _ => None,
    }
}

/// Parse `<number><unit>` (or `<count> x <number><unit>`) into grams
///
/// Trailing artifacts like `77g .` are ignored. A missing or unknown unit is
/// unparseable rather than silently assumed.
pub fn weight_in_grams(raw: &str) -> Result<f64, FieldIssue> {
    let lowered = raw.trim().to_ascii_lowercase();
    let s = lowered.trim_end_matches(|c: char| !c.is_ascii_alphanumeric());

    let (count, amount, unit) = if let Some(caps) = MULTIPACK.captures(s) {
        (caps[1].parse::<f64>(), caps[2].parse::<f64>(), caps.get(3))
    } else if let Some(caps) = SINGLE.captures(s) {
        (Ok(1.0), caps[1].parse::<f64>(), caps.get(2))
    } else {
        return Err(FieldIssue::Unparseable);
    };

    let (Ok(count), Ok(amount), Some(unit)) = (count, amount, unit) else {
        return Err(FieldIssue::Unparseable);
    };
    let factor = grams_per_unit(unit.as_str()).ok_or(FieldIssue::Unparseable)?;
    Ok(round_milligrams(count * amount * factor))
}

fn round_milligrams(grams: f64) -> f64 {
    (grams * 1000.0).round() / 1000.0
}

/// Logistics segmentation by weight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightClass {
    Light,
    MidSized,
    Heavy,
    TruckRequired,
    Invalid,
}

impl WeightClass {
    /// Classify a weight in grams
    ///
    /// Buckets in kilograms: `< 2` Light, `[2, 40]` Mid_Sized,
    /// `(40, 140]` Heavy, `> 140` Truck_Required.
    pub fn from_grams(grams: Option<f64>) -> Self {
        let Some(grams) = grams.filter(|g| g.is_finite() && *g >= 0.0) else {
            return Self::Invalid;
        };
        let kg = grams / 1000.0;
        if kg < 2.0 {
            Self::Light
        } else if kg <= 40.0 {
            Self::MidSized
        } else if kg <= 140.0 {
            Self::Heavy
        } else {
            Self::TruckRequired
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "Light",
            Self::MidSized => "Mid_Sized",
            Self::Heavy => "Heavy",
            Self::TruckRequired => "Truck_Required",
            Self::Invalid => "Invalid",
        }
    }
}

impl fmt::Display for WeightClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
