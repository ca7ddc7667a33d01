//! Permission, flag and effect bitfields.
//!
//! Entities store the raw integers; these types give them names.

use bitmask_enum::bitmask;
use emotes_common::BitField;

/// Platform-wide permissions granted through roles.
#[bitmask(i64)]
pub enum RolePermission {
    /// Upload emotes.
    CreateEmote = 1 << 0,
    /// Edit own emotes.
    EditEmote = 1 << 1,
    /// Create emote sets.
    CreateEmoteSet = 1 << 2,
    /// Edit own emote sets.
    EditEmoteSet = 1 << 3,

    /// File reports.
    CreateReport = 1 << 13,
    /// Send inbox messages.
    SendMessages = 1 << 14,

    /// Early access to new features.
    FeatureZeroWidthEmoteType = 1 << 23,
    /// Profile picture animation.
    FeatureProfilePictureAnimation = 1 << 24,
    /// Messaging access.
    FeatureMessagingPriority = 1 << 25,

    /// Create, edit and lift bans.
    ManageBans = 1 << 30,
    /// Create, edit, delete and assign roles.
    ManageRoles = 1 << 31,
    /// Triage reports.
    ManageReports = 1 << 32,
    /// Edit any user.
    ManageUsers = 1 << 33,

    /// Edit any emote.
    EditAnyEmote = 1 << 41,
    /// Edit any emote set.
    EditAnyEmoteSet = 1 << 42,

    /// See and use private objects.
    BypassPrivacy = 1 << 48,

    /// Moderate content.
    ManageContent = 1 << 54,
    /// Operate the platform stack.
    ManageStack = 1 << 55,
    /// Create and assign cosmetics.
    ManageCosmetics = 1 << 56,
    /// Grant entitlements.
    ManageEntitlements = 1 << 57,

    /// Implies every other permission.
    SuperAdministrator = 1 << 62,
}

impl BitField for RolePermission {}

impl RolePermission {
    /// Permissions granted to every user by default.
    #[must_use]
    pub fn default_grant() -> Self {
        Self::CreateEmote
            | Self::EditEmote
            | Self::CreateEmoteSet
            | Self::EditEmoteSet
            | Self::CreateReport
            | Self::SendMessages
    }

    /// Whether this bitfield grants `flag`, honoring the super-administrator bit.
    #[must_use]
    pub fn allows(self, flag: Self) -> bool {
        self.has(Self::SuperAdministrator) || self.has(flag)
    }
}

/// What an editor may do on behalf of the user who added them.
#[bitmask(i32)]
pub enum UserEditorPermission {
    /// Add, rename and remove emotes in the user's sets.
    ModifyEmotes = 1 << 0,
    /// Enable private emotes owned by the user.
    UsePrivateEmotes = 1 << 1,
    /// Edit the user's profile.
    ManageProfile = 1 << 2,
    /// Edit emotes owned by the user.
    ManageOwnedEmotes = 1 << 3,
    /// Create and edit the user's emote sets.
    ManageEmoteSets = 1 << 4,
    /// Manage billing.
    ManageBilling = 1 << 5,
    /// Add and remove other editors.
    ManageEditors = 1 << 6,
    /// Read the user's inbox.
    ViewMessages = 1 << 7,
}

impl BitField for UserEditorPermission {}

/// Emote flags.
#[bitmask(i32)]
pub enum EmoteFlags {
    /// Only usable by the owner and their editors.
    Private = 1 << 0,
    /// Approved for public listing.
    Listed = 1 << 1,
    /// Renders on top of the preceding emote.
    ZeroWidth = 1 << 8,
}

impl BitField for EmoteFlags {}

/// Per-set flags on an active emote.
#[bitmask(i32)]
pub enum ActiveEmoteFlags {
    /// Render as zero-width in this set.
    ZeroWidth = 1 << 0,
    /// Override platform global emotes of the same name.
    OverrideTwitchGlobal = 1 << 16,
    /// Override subscriber emotes of the same name.
    OverrideTwitchSubscriber = 1 << 17,
}

impl BitField for ActiveEmoteFlags {}

/// Effects applied to the victim of an active ban.
#[bitmask(i32)]
pub enum BanEffect {
    /// Every role permission is revoked.
    NoPermissions = 1 << 0,
    /// Tokens are rejected.
    NoAuth = 1 << 1,
    /// Objects owned by the victim are hidden.
    NoOwnership = 1 << 2,
    /// The victim's id is replaced with the zero id in public views.
    MemoryHole = 1 << 3,
    /// Requests from the victim's address are refused.
    BlockedIp = 1 << 4,
}

impl BitField for BanEffect {}

impl BanEffect {
    /// Human readable names of the set bits.
    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        [
            (Self::NoPermissions, "No Permissions"),
            (Self::NoAuth, "No Authentication"),
            (Self::NoOwnership, "No Ownership"),
            (Self::MemoryHole, "Memory Hole"),
            (Self::BlockedIp, "IP Blocked"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.has(*flag))
        .map(|(_, name)| name)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_permission_bits() {
        assert_eq!(RolePermission::ManageRoles.bits(), 1 << 31);
        assert_eq!(RolePermission::SuperAdministrator.bits(), 1 << 62);
        assert_eq!(RolePermission::from(1_i64 << 42), RolePermission::EditAnyEmoteSet);
    }

    #[test]
    fn test_super_administrator_allows_everything() {
        let admin = RolePermission::SuperAdministrator;
        assert!(admin.allows(RolePermission::ManageBans));
        assert!(!admin.has(RolePermission::ManageBans));

        let user = RolePermission::default_grant();
        assert!(user.allows(RolePermission::EditEmoteSet));
        assert!(!user.allows(RolePermission::EditAnyEmoteSet));
    }

    #[test]
    fn test_ban_effect_names() {
        let effects = BanEffect::NoOwnership | BanEffect::MemoryHole;
        assert_eq!(effects.names(), vec!["No Ownership", "Memory Hole"]);
    }
}
