pub mod qualification;
pub mod recommendations;
pub mod requirements;
pub mod similarity;

pub use qualification::QualificationService;
pub use recommendations::RecommendationService;
pub use similarity::SimilarityService;
