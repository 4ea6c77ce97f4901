//! Event type tags the gateway documents

pub const BUILTIN_EVENT_TAGS: &[&str] = &[
    // Messages
    "FriendMessage",
    "GroupMessage",
    "TempMessage",
    "StrangerMessage",
    "OtherClientMessage",
    "ActiveFriendMessage",
    "ActiveGroupMessage",
    "ActiveTempMessage",
    "ActiveStrangerMessage",
    "FriendSyncMessage",
    "GroupSyncMessage",
    "TempSyncMessage",
    "StrangerSyncMessage",
    // Bot
    "BotOnlineEvent",
    "BotOfflineEventActive",
    "BotOfflineEventForce",
    "BotOfflineEventDropped",
    "BotReloginEvent",
    "BotGroupPermissionChangeEvent",
    "BotMuteEvent",
    "BotUnmuteEvent",
    "BotJoinGroupEvent",
    "BotLeaveEventActive",
    "BotLeaveEventKick",
    "BotLeaveEventDisband",
    // Friend
    "FriendInputStatusChangedEvent",
    "FriendNickChangedEvent",
    "FriendRecallEvent",
    "FriendAddEvent",
    "FriendDeleteEvent",
    // Group
    "GroupRecallEvent",
    "NudgeEvent",
    "GroupNameChangeEvent",
    "GroupEntranceAnnouncementChangeEvent",
    "GroupMuteAllEvent",
    "GroupAllowAnonymousChatEvent",
    "GroupAllowConfessTalkEvent",
    "GroupAllowMemberInviteEvent",
    // Member
    "MemberJoinEvent",
    "MemberLeaveEventKick",
    "MemberLeaveEventQuit",
    "MemberCardChangeEvent",
    "MemberSpecialTitleChangeEvent",
    "MemberPermissionChangeEvent",
    "MemberMuteEvent",
    "MemberUnmuteEvent",
    "MemberHonorChangeEvent",
    // Requests
    "NewFriendRequestEvent",
    "MemberJoinRequestEvent",
    "BotInvitedJoinGroupRequestEvent",
    // Other clients
    "OtherClientOnlineEvent",
    "OtherClientOfflineEvent",
    // Console
    "CommandExecutedEvent",
];
