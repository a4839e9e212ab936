//! Constants shared across the pipeline.

/// Default seed for shuffling, splitting and row transforms.
pub const DEF_SEED: u64 = 1337;

/// Value used in place of NaN/Inf entries and for prong-axis padding.
pub const DEF_MASK: f32 = 0.0;

/// Energy label: total event energy (e.g. neutrino energy).
pub const LABEL_TOTAL: &str = "total";

/// Energy label: primary component (e.g. lepton energy).
pub const LABEL_PRIMARY: &str = "primary";

/// Energy label: secondary component (total minus primary).
pub const LABEL_SECONDARY: &str = "secondary";
