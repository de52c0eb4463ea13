//! Compile-time–checked column identifiers for all tables.

use sea_query::Iden;

#[derive(Iden)]
pub enum Events {
    Table,
    EventId,
    Uid,
    Title,
    EventType,
    Status,
    StartAt,
    EndAt,
    CheckinWindowMins,
    GraceMins,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum EventParticipants {
    Table,
    ParticipantId,
    EventId,
    UserId,
    Status,
    AttendanceStatus,
    AttendanceMarkedAt,
    AttendanceMarkedBy,
    AttendanceNotes,
    AttendanceUpdatedAt,
    RegisteredAt,
}

#[derive(Iden)]
pub enum EventAttendanceAudit {
    Table,
    AuditId,
    EventId,
    ParticipantId,
    UserId,
    MarkedBy,
    Action,
    PreviousStatus,
    NewStatus,
    Reason,
    DedupeKey,
    PerformedAt,
}

#[derive(Iden)]
pub enum GamificationEvents {
    Table,
    Id,
    UserId,
    EventId,
    Action,
    PointsDelta,
    Metadata,
    DedupeKey,
    CreatedAt,
}

#[derive(Iden)]
pub enum UserGamificationStats {
    Table,
    UserId,
    TotalPoints,
    LifetimePoints,
    CurrentLevel,
    PointsToNextLevel,
    CurrentStreak,
    LongestStreak,
    LastStreakEvent,
    EventsRegistered,
    EventsAttended,
    EventsHosted,
    BadgesEarned,
    LastRewardedAt,
    LastBadgeAwardedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum PointsLevelThresholds {
    Table,
    Level,
    PointsCumulative,
    RewardTitle,
}

#[derive(Iden)]
pub enum Achievements {
    Table,
    AchievementId,
    BadgeCode,
    Name,
    Description,
    ThresholdType,
    ThresholdValue,
    Thresholds,
    TierPoints,
    AchievementPoints,
    IsActive,
    DisplayOrder,
}

#[derive(Iden)]
pub enum AchievementMappings {
    Table,
    MappingId,
    AchievementId,
    EventId,
    EventType,
    TriggerAction,
    TargetRole,
    IsActive,
    CreatedBy,
    CreatedAt,
}

#[derive(Iden)]
pub enum UserAchievements {
    Table,
    UserAchievementId,
    UserId,
    AchievementId,
    BadgeLevel,
    EarnedAt,
    AwardedBy,
}

#[derive(Iden)]
pub enum UserAchievementProgress {
    Table,
    UserId,
    AchievementCode,
    CurrentCount,
    BadgeLevel,
    LastUpdatedAt,
}

#[derive(Iden)]
pub enum AchievementProgressAudit {
    Table,
    Id,
    UserId,
    EventId,
    AchievementCode,
    Delta,
    Meta,
    JobId,
    CreatedAt,
}
