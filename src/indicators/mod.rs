pub mod overlaps;
pub mod patterns;
pub mod volatility;

// Re-export the calculators
pub use self::overlaps::OverlapCalculator;
pub use self::volatility::VolatilityCalculator;
