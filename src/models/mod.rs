pub mod audit;
pub mod auth;
pub mod blueprint;
pub mod credit;
pub mod feed;
pub mod media;
pub mod optimizer;
pub mod outcome;
pub mod platform;
pub mod report;
pub mod research;
pub mod user;

pub use self::audit::{
    Audit, AuditResult, AuditSection, TimestampFeedback, AUDIT_IN_PROGRESS_STATUSES,
};
pub use self::auth::{AuthContext, ExportClaims, SessionClaims};
pub use self::blueprint::BlueprintSnapshot;
pub use self::credit::{CreditEntryType, CreditLedgerEntry};
pub use self::feed::{
    FeedAutoIngestRun, FeedRepostPackage, FeedSourceFollow, FeedTelemetryEvent, FeedTranscriptJob,
    TranscriptSource, REPOST_ALLOWED_STATUSES,
};
pub use self::media::{MediaAsset, MediaDownloadJob, Upload, MEDIA_JOB_IN_PROGRESS_STATUSES};
pub use self::optimizer::{
    CombinedDiff, DetectorDiff, DetectorKey, DetectorRanking, DetectorResult, DraftSnapshot,
    ImprovementDiff, LineLevelEdit, NextAction, ScriptVariantBatch, StyleKey, VariantStructure,
};
pub use self::outcome::{CalibrationSnapshot, OutcomeMetric, RetentionPoint};
pub use self::platform::{
    DiscoveryMode, ExportFormat, FormatType, Platform, SortDirection, Timeframe,
    SHORT_FORM_MAX_SECONDS,
};
pub use self::report::ReportShareLink;
pub use self::research::{ItemMetrics, ResearchCollection, ResearchItem};
pub use self::user::{Competitor, Connection, Profile, User};
