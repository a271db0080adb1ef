use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{EnumCount, IntoEnumIterator};

/// Label reported when the model is not confident enough.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Classes the tomato leaf model was trained on.
///
/// Declaration order is the model's output order; reordering variants
/// without retraining silently mislabels every prediction.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::AsRefStr,
    strum_macros::EnumString,
    strum_macros::EnumIter,
    strum_macros::EnumCount,
)]
pub enum ClassLabel {
    #[strum(serialize = "Bacterial_spot")]
    BacterialSpot,
    #[strum(serialize = "Early_blight")]
    EarlyBlight,
    #[strum(serialize = "Late_blight")]
    LateBlight,
    #[strum(serialize = "Leaf_Mold")]
    LeafMold,
    #[strum(serialize = "Septoria_leaf_spot")]
    SeptoriaLeafSpot,
    #[strum(serialize = "Spider_mites")]
    SpiderMites,
    #[strum(serialize = "Target_Spot")]
    TargetSpot,
    #[strum(serialize = "Tomato_Yellow_Leaf_Curl_Virus")]
    TomatoYellowLeafCurlVirus,
    #[strum(serialize = "Tomato_mosaic_virus")]
    TomatoMosaicVirus,
    #[strum(serialize = "Healthy")]
    Healthy,
}

impl ClassLabel {
    pub fn count() -> usize {
        Self::COUNT
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::iter().nth(index)
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Outcome of the threshold decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prediction {
    Label(ClassLabel),
    Unknown,
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prediction::Label(label) => write!(f, "{}", label),
            Prediction::Unknown => f.write_str(UNKNOWN_LABEL),
        }
    }
}

/// Body returned by `POST /predict`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClassificationResult {
    pub prediction: String,
    pub confidence: f32,
    pub image_path: String,
}
