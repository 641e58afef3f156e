pub mod audits;
pub mod blueprint;
pub mod credits;
pub mod feed;
pub mod job_queue;
pub mod media;
pub mod multimodal;
pub mod optimizer;
pub mod outcomes;
pub mod rate_limit;
pub mod report;
pub mod report_share;
pub mod research;
pub mod session;
pub mod signed_url;
pub mod transcripts;
pub mod users;
pub mod youtube;

pub use self::audits::AuditService;
pub use self::blueprint::BlueprintService;
pub use self::credits::CreditService;
pub use self::feed::{FeedService, TelemetryService};
pub use self::job_queue::JobQueueService;
pub use self::media::MediaService;
pub use self::multimodal::LlmClient;
pub use self::optimizer::OptimizerService;
pub use self::outcomes::OutcomeService;
pub use self::rate_limit::RateLimitService;
pub use self::report::ReportService;
pub use self::report_share::ReportShareService;
pub use self::research::ResearchService;
pub use self::session::SessionTokenService;
pub use self::transcripts::TranscriptService;
