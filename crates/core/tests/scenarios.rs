//! End-to-end scenarios over the in-memory store.
//!
//! Run with: `cargo test -p emotes-core --test scenarios`

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use bson::doc;
use bson::oid::ObjectId;
use tokio::sync::mpsc;

use emotes_common::config::{LimitsConfig, StorageConfig};
use emotes_common::{AppError, Cache, KeyScheme, MemoryKeyValueCache, ZERO_ID};
use emotes_core::mutations::{
    BanOptions, DeleteEmoteOptions, EditEmoteSetOptions, EditorChange, EmoteSetEmoteChange,
    ListItemAction, SendInboxOptions, SetActiveEmoteSetOptions, SetReadStatesOptions,
};
use emotes_core::{Mutator, Query};
use emotes_db::builders::{
    BanBuilder, EmoteBuilder, EmoteSetBuilder, MessageBuilder, RoleBuilder, UserBuilder,
};
use emotes_db::structures::{
    ActiveEmote, ActiveEmoteFlags, Ban, BanEffect, Emote, EmoteFlags, EmoteLifecycle, EmoteSet,
    EmoteVersion, ImageFile, Message, MessageDataInbox, MessageRead, Role, RolePermission, User,
    UserConnection, UserConnectionPlatform, UserEditor, UserEditorPermission, never,
};
use emotes_db::{Collection, ObjectAcl};
use emotes_db::test_utils::{MemoryObjectStorage, MemoryStore};
use emotes_events::{EventEmitter, LocalEventPublisher};

struct Harness {
    store: Arc<MemoryStore>,
    storage: Arc<MemoryObjectStorage>,
    emitter: EventEmitter,
    mutator: Mutator,
    query: Query,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let storage = Arc::new(MemoryObjectStorage::new());
    let emitter = EventEmitter::new();
    let mutator = Mutator::new(
        store.clone(),
        storage.clone(),
        Arc::new(LocalEventPublisher::new(emitter.clone())),
    );
    let cache = Cache::new(Arc::new(MemoryKeyValueCache::new()), KeyScheme::new("emotes", 1));
    let query = Query::new(store.clone(), cache);
    Harness {
        store,
        storage,
        emitter,
        mutator,
        query,
    }
}

/// A user holding one role with `allowed` at `position`.
fn user_with(name: &str, position: i32, allowed: RolePermission) -> User {
    let mut user = User::new(ObjectId::new(), name);
    user.roles.push(Role {
        position,
        allowed: allowed.bits(),
        ..Role::new(ObjectId::new(), format!("{name}-role"))
    });
    user
}

fn full_set(owner_id: ObjectId, slots: usize) -> EmoteSet {
    let mut set = EmoteSet::new(ObjectId::new(), owner_id, "Channel", i32::try_from(slots).unwrap());
    for i in 0..slots {
        set.emotes.push(ActiveEmote::new(
            ObjectId::new(),
            format!("emote{i}"),
            ActiveEmoteFlags::none(),
            owner_id,
        ));
    }
    set
}

#[tokio::test]
async fn test_role_edit_requires_strictly_higher_position() {
    let h = harness();
    let role = Role {
        position: 10,
        ..Role::new(ObjectId::new(), "Moderator")
    };
    h.store.seed_as(Collection::Roles, &role).unwrap();

    let peer = user_with("peer", 10, RolePermission::ManageRoles);
    let mut b = RoleBuilder::new(role.clone());
    b.set_name("Janitor");
    let err = h.mutator.edit_role(&peer, &mut b).await.unwrap_err();
    assert!(matches!(err, AppError::InsufficientPrivilege(_)));
    assert_eq!(err.code(), 70403);

    let senior = user_with("senior", 11, RolePermission::ManageRoles);
    let mut b = RoleBuilder::new(role.clone());
    b.set_name("Janitor");
    h.mutator.edit_role(&senior, &mut b).await.unwrap();

    let stored: Vec<Role> = h.store.all_as(Collection::Roles).unwrap();
    assert_eq!(stored[0].name, "Janitor");
    assert!(b.ensure_usable().is_err());
}

#[tokio::test]
async fn test_role_cannot_be_moved_above_actor() {
    let h = harness();
    let role = Role {
        position: 3,
        ..Role::new(ObjectId::new(), "Helper")
    };
    h.store.seed_as(Collection::Roles, &role).unwrap();

    let actor = user_with("actor", 5, RolePermission::ManageRoles);
    let mut b = RoleBuilder::new(role);
    b.set_position(5);
    assert!(matches!(
        h.mutator.edit_role(&actor, &mut b).await,
        Err(AppError::InsufficientPrivilege(_))
    ));
}

#[tokio::test]
async fn test_emote_add_respects_slot_limit() {
    let h = harness();
    let owner = user_with("owner", 1, RolePermission::EditEmoteSet);
    h.store.seed_as(Collection::Users, &owner).unwrap();
    let set = full_set(owner.id, 5);
    h.store.seed_as(Collection::EmoteSets, &set).unwrap();
    let emote = Emote::new(ObjectId::new(), ObjectId::new(), "Sixth");
    h.store.seed_as(Collection::Emotes, &emote).unwrap();

    let mut b = EmoteSetBuilder::new(set.clone());
    let err = h
        .mutator
        .set_emote_set_emotes(&owner, &mut b, vec![EmoteSetEmoteChange::add(emote.id)])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NoSpaceAvailable { slots: 5 }));
    assert_eq!(err.fields().get("SLOTS"), Some(&serde_json::json!(5)));

    let admin = user_with("admin", 50, RolePermission::EditAnyEmoteSet);
    let mut b = EmoteSetBuilder::new(set.clone());
    h.mutator
        .set_emote_set_emotes(&admin, &mut b, vec![EmoteSetEmoteChange::add(emote.id)])
        .await
        .unwrap();

    let stored: Vec<EmoteSet> = h.store.all_as(Collection::EmoteSets).unwrap();
    assert_eq!(stored[0].emotes.len(), 6);
    assert_eq!(stored[0].emotes[5].name, "Sixth");
    assert_eq!(stored[0].emotes[5].actor_id, admin.id);
}

#[tokio::test]
async fn test_private_emote_needs_owner_editor_grant() {
    let h = harness();
    let channel = User::new(ObjectId::new(), "channel");
    let mut artist = User::new(ObjectId::new(), "artist");
    h.store.seed_as(Collection::Users, &channel).unwrap();

    let mut emote = Emote::new(ObjectId::new(), artist.id, "Secret");
    emote.flags = EmoteFlags::Private.bits();
    h.store.seed_as(Collection::Emotes, &emote).unwrap();
    let set = EmoteSet::new(ObjectId::new(), channel.id, "Channel", 10);
    h.store.seed_as(Collection::EmoteSets, &set).unwrap();

    h.store.seed_as(Collection::Users, &artist).unwrap();
    let mut b = EmoteSetBuilder::new(set.clone());
    let err = h
        .mutator
        .set_emote_set_emotes(&channel, &mut b, vec![EmoteSetEmoteChange::add(emote.id)])
        .await
        .unwrap_err();
    match err {
        AppError::InsufficientPrivilege(detail) => assert_eq!(detail, "emote is private"),
        other => panic!("unexpected error: {other:?}"),
    }

    let h = harness();
    h.store.seed_as(Collection::Users, &channel).unwrap();
    h.store.seed_as(Collection::Emotes, &emote).unwrap();
    h.store.seed_as(Collection::EmoteSets, &set).unwrap();
    artist
        .editors
        .push(UserEditor::new(channel.id, UserEditorPermission::UsePrivateEmotes, true));
    h.store.seed_as(Collection::Users, &artist).unwrap();

    let mut b = EmoteSetBuilder::new(set);
    h.mutator
        .set_emote_set_emotes(&channel, &mut b, vec![EmoteSetEmoteChange::add(emote.id)])
        .await
        .unwrap();
    assert_eq!(b.snapshot().emotes.len(), 1);
}

#[tokio::test]
async fn test_emote_set_changes_are_dispatched() {
    let h = harness();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _unbind = h.emitter.listen(&["dispatch"], tx);

    let owner = User::new(ObjectId::new(), "owner");
    h.store.seed_as(Collection::Users, &owner).unwrap();
    let emote = Emote::new(ObjectId::new(), owner.id, "Wave");
    h.store.seed_as(Collection::Emotes, &emote).unwrap();
    let set = EmoteSet::new(ObjectId::new(), owner.id, "Channel", 10);
    h.store.seed_as(Collection::EmoteSets, &set).unwrap();

    let mut b = EmoteSetBuilder::new(set.clone());
    h.mutator
        .set_emote_set_emotes(
            &owner,
            &mut b,
            vec![EmoteSetEmoteChange::add(emote.id).named("hello")],
        )
        .await
        .unwrap();

    let raw = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let envelope: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(envelope["d"]["type"], "emote_set.update");
    assert_eq!(envelope["d"]["body"]["id"], set.id.to_hex());

    let logs = h.store.all(Collection::AuditLogs);
    assert_eq!(logs.len(), 1);
}

#[tokio::test]
async fn test_duplicate_alias_conflicts() {
    let h = harness();
    let owner = User::new(ObjectId::new(), "owner");
    h.store.seed_as(Collection::Users, &owner).unwrap();
    let emote = Emote::new(ObjectId::new(), owner.id, "Wave");
    h.store.seed_as(Collection::Emotes, &emote).unwrap();
    let mut set = EmoteSet::new(ObjectId::new(), owner.id, "Channel", 10);
    set.emotes.push(ActiveEmote::new(
        ObjectId::new(),
        "Wave",
        ActiveEmoteFlags::none(),
        owner.id,
    ));
    h.store.seed_as(Collection::EmoteSets, &set).unwrap();

    let mut b = EmoteSetBuilder::new(set);
    let err = h
        .mutator
        .set_emote_set_emotes(&owner, &mut b, vec![EmoteSetEmoteChange::add(emote.id)])
        .await
        .unwrap_err();
    assert_eq!(err.code(), 704612);
}

#[tokio::test]
async fn test_memory_holed_owner_is_zeroed_in_emote_query() {
    let h = harness();
    let victim = User::new(ObjectId::new(), "victim");
    let moderator = User::new(ObjectId::new(), "moderator");
    h.store.seed_as(Collection::Users, &victim).unwrap();
    let ban = Ban::new(
        ObjectId::new(),
        victim.id,
        moderator.id,
        "spam",
        never(),
        BanEffect::MemoryHole,
    );
    h.store.seed_as(Collection::Bans, &ban).unwrap();

    let emote = Emote::new(ObjectId::new(), victim.id, "Gone");
    h.store.seed_as(Collection::Emotes, &emote).unwrap();

    let emotes = h.query.emotes(doc! { "_id": emote.id }).await.unwrap();
    assert_eq!(emotes.len(), 1);
    assert_eq!(emotes[0].owner_id, ZERO_ID);
    assert!(emotes[0].owner.is_none());
}

#[tokio::test]
async fn test_no_ownership_hides_emotes() {
    let h = harness();
    let victim = User::new(ObjectId::new(), "victim");
    let clean = User::new(ObjectId::new(), "clean");
    h.store.seed_as(Collection::Users, &victim).unwrap();
    h.store.seed_as(Collection::Users, &clean).unwrap();
    let ban = Ban::new(
        ObjectId::new(),
        victim.id,
        ObjectId::new(),
        "stolen art",
        never(),
        BanEffect::NoOwnership,
    );
    h.store.seed_as(Collection::Bans, &ban).unwrap();
    h.store
        .seed_as(Collection::Emotes, &Emote::new(ObjectId::new(), victim.id, "Stolen"))
        .unwrap();
    let kept = Emote::new(ObjectId::new(), clean.id, "Original");
    h.store.seed_as(Collection::Emotes, &kept).unwrap();

    let emotes = h.query.emotes(doc! {}).await.unwrap();
    assert_eq!(emotes.len(), 1);
    assert_eq!(emotes[0].id, kept.id);
    assert_eq!(emotes[0].owner.as_ref().unwrap().username, "clean");
}

#[tokio::test]
async fn test_inbox_skips_recipients_who_blocked_the_author() {
    let h = harness();
    let author = user_with("author", 1, RolePermission::SendMessages);
    let mut r1 = User::new(ObjectId::new(), "r1");
    r1.blocked_user_ids.push(author.id);
    let r2 = User::new(ObjectId::new(), "r2");
    h.store.seed_as(Collection::Users, &r1).unwrap();
    h.store.seed_as(Collection::Users, &r2).unwrap();

    let msg = Message::new(
        ObjectId::new(),
        author.id,
        MessageDataInbox {
            subject: "Hello".into(),
            content: "World".into(),
            ..Default::default()
        },
    );
    let mut b = MessageBuilder::new(msg);
    let delivered = h
        .mutator
        .send_inbox_message(
            &author,
            &mut b,
            SendInboxOptions {
                recipients: vec![r1.id, r2.id],
                consider_blocked_users: true,
            },
        )
        .await
        .unwrap();

    assert_eq!(delivered, vec![r2.id]);
    assert_eq!(h.store.len(Collection::Messages), 1);
    let reads: Vec<MessageRead> = h.store.all_as(Collection::MessagesRead).unwrap();
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0].recipient_id, r2.id);
    assert!(!reads[0].read);
}

#[tokio::test]
async fn test_inbox_with_every_recipient_blocking_writes_nothing() {
    let h = harness();
    let author = user_with("author", 1, RolePermission::SendMessages);
    let mut r1 = User::new(ObjectId::new(), "r1");
    r1.blocked_user_ids.push(author.id);
    h.store.seed_as(Collection::Users, &r1).unwrap();

    let msg = Message::new(ObjectId::new(), author.id, MessageDataInbox::default());
    let mut b = MessageBuilder::new(msg);
    let delivered = h
        .mutator
        .send_inbox_message(
            &author,
            &mut b,
            SendInboxOptions {
                recipients: vec![r1.id],
                consider_blocked_users: true,
            },
        )
        .await
        .unwrap();

    assert!(delivered.is_empty());
    assert_eq!(h.store.len(Collection::Messages), 0);
    assert_eq!(h.store.len(Collection::MessagesRead), 0);
    assert!(matches!(
        b.ensure_usable(),
        Err(AppError::MutateTaintedObject)
    ));
}

#[tokio::test]
async fn test_user_query_resolves_default_and_entitled_roles() {
    let h = harness();
    let everyone = Role {
        position: 0,
        default: true,
        allowed: RolePermission::CreateEmote.bits(),
        ..Role::new(ObjectId::new(), "Everyone")
    };
    let moderator = Role {
        position: 20,
        allowed: RolePermission::ManageReports.bits(),
        ..Role::new(ObjectId::new(), "Moderator")
    };
    h.store.seed_as(Collection::Roles, &everyone).unwrap();
    h.store.seed_as(Collection::Roles, &moderator).unwrap();

    let mut user = User::new(ObjectId::new(), "mod");
    user.role_ids.push(moderator.id);
    h.store.seed_as(Collection::Users, &user).unwrap();

    let loaded = h.query.user(user.id).await.unwrap().unwrap();
    let names: Vec<&str> = loaded.roles.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Everyone", "Moderator"]);
    assert!(loaded.has_permission(RolePermission::ManageReports));
    assert!(loaded.has_permission(RolePermission::CreateEmote));
    assert_eq!(loaded.state.role_position, 20);
}

fn image(key: &str) -> ImageFile {
    ImageFile {
        name: "1x.webp".into(),
        key: key.into(),
        bucket: String::new(),
        content_type: "image/webp".into(),
        width: 32,
        height: 32,
        frame_count: 1,
        size: 1024,
    }
}

fn twitch(id: &str) -> UserConnection {
    UserConnection {
        id: id.into(),
        platform: UserConnectionPlatform::Twitch,
        linked_at: bson::DateTime::now(),
        emote_slots: 300,
        emote_set_id: None,
        data: doc! {},
        grant: None,
        emote_set: None,
    }
}

fn emote_names(store: &MemoryStore) -> Vec<String> {
    let sets: Vec<EmoteSet> = store.all_as(Collection::EmoteSets).unwrap();
    sets[0].emotes.iter().map(|e| e.name.clone()).collect()
}

#[tokio::test]
async fn test_immutable_set_rejects_emote_changes() {
    let h = harness();
    let owner = user_with("owner", 1, RolePermission::EditEmoteSet);
    h.store.seed_as(Collection::Users, &owner).unwrap();
    let emote = Emote::new(ObjectId::new(), owner.id, "Wave");
    h.store.seed_as(Collection::Emotes, &emote).unwrap();
    let mut set = EmoteSet::new(ObjectId::new(), owner.id, "Locked", 10);
    set.immutable = true;
    h.store.seed_as(Collection::EmoteSets, &set).unwrap();

    let mut b = EmoteSetBuilder::new(set);
    let err = h
        .mutator
        .set_emote_set_emotes(&owner, &mut b, vec![EmoteSetEmoteChange::add(emote.id)])
        .await
        .unwrap_err();
    match err {
        AppError::InsufficientPrivilege(detail) => {
            assert_eq!(detail, "this emote set is immutable");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(emote_names(&h.store).is_empty());
    assert!(b.update().is_empty());
}

#[tokio::test]
async fn test_immutable_set_can_only_be_unlocked_by_super_admin() {
    let h = harness();
    let owner = user_with("owner", 1, RolePermission::EditEmoteSet);
    let root = user_with("root", 100, RolePermission::SuperAdministrator);
    let mut set = EmoteSet::new(ObjectId::new(), owner.id, "Locked", 10);
    set.immutable = true;
    h.store.seed_as(Collection::EmoteSets, &set).unwrap();

    let mut b = EmoteSetBuilder::new(set.clone());
    b.set_name("Renamed");
    assert!(matches!(
        h.mutator.edit_emote_set(&root, &mut b, EditEmoteSetOptions::default()).await,
        Err(AppError::InsufficientPrivilege(_))
    ));

    let mut b = EmoteSetBuilder::new(set.clone());
    b.set_immutable(false);
    assert!(matches!(
        h.mutator.edit_emote_set(&owner, &mut b, EditEmoteSetOptions::default()).await,
        Err(AppError::InsufficientPrivilege(_))
    ));

    let mut b = EmoteSetBuilder::new(set);
    b.set_immutable(false);
    h.mutator
        .edit_emote_set(&root, &mut b, EditEmoteSetOptions::default())
        .await
        .unwrap();
    let stored: Vec<EmoteSet> = h.store.all_as(Collection::EmoteSets).unwrap();
    assert!(!stored[0].immutable);
    assert_eq!(stored[0].name, "Locked");
}

#[tokio::test]
async fn test_failed_emote_batch_leaves_builder_reusable() {
    let h = harness();
    let owner = User::new(ObjectId::new(), "owner");
    h.store.seed_as(Collection::Users, &owner).unwrap();
    let alpha = Emote::new(ObjectId::new(), owner.id, "Alpha");
    let gamma = Emote::new(ObjectId::new(), owner.id, "Gamma");
    h.store.seed_as(Collection::Emotes, &alpha).unwrap();
    h.store.seed_as(Collection::Emotes, &gamma).unwrap();
    let set = EmoteSet::new(ObjectId::new(), owner.id, "Channel", 10);
    h.store.seed_as(Collection::EmoteSets, &set).unwrap();

    let mut b = EmoteSetBuilder::new(set);
    let err = h
        .mutator
        .set_emote_set_emotes(
            &owner,
            &mut b,
            vec![EmoteSetEmoteChange::add(alpha.id), EmoteSetEmoteChange::add(ObjectId::new())],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::UnknownEmote(_)));
    assert!(!b.is_tainted());
    assert!(b.snapshot().emotes.is_empty());
    assert!(b.update().is_empty());

    h.mutator
        .set_emote_set_emotes(&owner, &mut b, vec![EmoteSetEmoteChange::add(gamma.id)])
        .await
        .unwrap();
    assert_eq!(emote_names(&h.store), vec!["Gamma".to_string()]);
}

#[tokio::test]
async fn test_failed_emote_set_write_is_rolled_back() {
    let h = harness();
    let owner = User::new(ObjectId::new(), "owner");
    h.store.seed_as(Collection::Users, &owner).unwrap();
    let emote = Emote::new(ObjectId::new(), owner.id, "Wave");
    h.store.seed_as(Collection::Emotes, &emote).unwrap();
    let set = EmoteSet::new(ObjectId::new(), owner.id, "Channel", 10);
    h.store.seed_as(Collection::EmoteSets, &set).unwrap();
    h.store.fail_writes(Collection::EmoteSets);

    let mut b = EmoteSetBuilder::new(set);
    let err = h
        .mutator
        .set_emote_set_emotes(&owner, &mut b, vec![EmoteSetEmoteChange::add(emote.id)])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InternalServerError(_)));
    assert!(!b.is_tainted());
    assert!(b.snapshot().emotes.is_empty());
    assert!(b.update().is_empty());
}

#[tokio::test]
async fn test_emote_set_name_bounds_accept_inverted_limits() {
    let h = harness();
    let mutator = Mutator::new(
        h.store.clone(),
        h.storage.clone(),
        Arc::new(LocalEventPublisher::new(h.emitter.clone())),
    )
    .with_limits(LimitsConfig {
        emote_set_name_min: 48,
        emote_set_name_max: 3,
        ..LimitsConfig::default()
    });
    let owner = user_with("owner", 1, RolePermission::EditEmoteSet);
    let set = EmoteSet::new(ObjectId::new(), owner.id, "Channel", 10);
    h.store.seed_as(Collection::EmoteSets, &set).unwrap();

    for bad in ["ab".to_string(), "x".repeat(49)] {
        let mut b = EmoteSetBuilder::new(set.clone());
        b.set_name(bad);
        assert!(matches!(
            mutator.edit_emote_set(&owner, &mut b, EditEmoteSetOptions::default()).await,
            Err(AppError::ValidationRejected(_))
        ));
    }

    let mut b = EmoteSetBuilder::new(set.clone());
    b.set_name("x".repeat(48));
    mutator
        .edit_emote_set(&owner, &mut b, EditEmoteSetOptions::default())
        .await
        .unwrap();

    let mut b = EmoteSetBuilder::new(set);
    b.set_name("abc");
    mutator
        .edit_emote_set(&owner, &mut b, EditEmoteSetOptions::default())
        .await
        .unwrap();
    let stored: Vec<EmoteSet> = h.store.all_as(Collection::EmoteSets).unwrap();
    assert_eq!(stored[0].name, "abc");
}

#[tokio::test]
async fn test_second_mutation_with_same_builder_is_tainted() {
    let h = harness();
    let owner = user_with("owner", 1, RolePermission::EditEmoteSet);
    let set = EmoteSet::new(ObjectId::new(), owner.id, "Channel", 10);
    h.store.seed_as(Collection::EmoteSets, &set).unwrap();

    let mut b = EmoteSetBuilder::new(set);
    b.set_name("Stream");
    h.mutator
        .edit_emote_set(&owner, &mut b, EditEmoteSetOptions::default())
        .await
        .unwrap();

    b.set_name("Again");
    let err = h
        .mutator
        .edit_emote_set(&owner, &mut b, EditEmoteSetOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, AppError::MutateTaintedObject);
    let stored: Vec<EmoteSet> = h.store.all_as(Collection::EmoteSets).unwrap();
    assert_eq!(stored[0].name, "Stream");
}

#[tokio::test]
async fn test_ban_rules_and_victim_notice() {
    let h = harness();
    let moderator = user_with("moderator", 10, RolePermission::ManageBans);

    let mut b = BanBuilder::new(Ban::new(
        ObjectId::new(),
        moderator.id,
        moderator.id,
        "test",
        never(),
        BanEffect::NoAuth,
    ));
    assert!(matches!(
        h.mutator.create_ban(&moderator, &mut b, BanOptions::default()).await,
        Err(AppError::DontBeSilly(_))
    ));

    let mut admin = User::new(ObjectId::new(), "admin");
    admin.state.role_position = 20;
    h.store.seed_as(Collection::Users, &admin).unwrap();
    let mut b = BanBuilder::new(Ban::new(
        ObjectId::new(),
        admin.id,
        moderator.id,
        "coup",
        never(),
        BanEffect::NoAuth,
    ));
    assert!(matches!(
        h.mutator.create_ban(&moderator, &mut b, BanOptions::default()).await,
        Err(AppError::InsufficientPrivilege(_))
    ));
    assert_eq!(h.store.len(Collection::Bans), 0);

    let victim = User::new(ObjectId::new(), "victim");
    h.store.seed_as(Collection::Users, &victim).unwrap();
    let mut b = BanBuilder::new(Ban::new(
        ObjectId::new(),
        victim.id,
        moderator.id,
        "spam",
        never(),
        BanEffect::NoAuth,
    ));
    h.mutator
        .create_ban(&moderator, &mut b, BanOptions::default())
        .await
        .unwrap();

    assert_eq!(h.store.len(Collection::Bans), 1);
    let notices: Vec<Message<MessageDataInbox>> = h.store.all_as(Collection::Messages).unwrap();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].data.placeholders["BAN_EXPIRE_AT"], "never");
    assert_eq!(notices[0].data.placeholders["BAN_REASON"], "spam");
    let reads: Vec<MessageRead> = h.store.all_as(Collection::MessagesRead).unwrap();
    assert_eq!(reads[0].recipient_id, victim.id);
}

#[tokio::test]
async fn test_ban_survives_failed_notice() {
    let h = harness();
    let moderator = user_with("moderator", 10, RolePermission::ManageBans);
    let victim = User::new(ObjectId::new(), "victim");
    h.store.seed_as(Collection::Users, &victim).unwrap();
    h.store.fail_writes(Collection::Messages);

    let mut b = BanBuilder::new(Ban::new(
        ObjectId::new(),
        victim.id,
        moderator.id,
        "spam",
        bson::DateTime::from_millis(1_700_000_000_000),
        BanEffect::MemoryHole,
    ));
    h.mutator
        .create_ban(&moderator, &mut b, BanOptions::default())
        .await
        .unwrap();
    assert_eq!(h.store.len(Collection::Bans), 1);
    assert_eq!(h.store.len(Collection::Messages), 0);
}

#[tokio::test]
async fn test_read_states_collect_per_row_errors() {
    let h = harness();
    let artist = User::new(ObjectId::new(), "artist");
    let emote = Emote::new(ObjectId::new(), artist.id, "Wave");
    h.store.seed_as(Collection::Emotes, &emote).unwrap();
    let request_id = h
        .mutator
        .send_mod_request(&artist, emote.id, "please list", None)
        .await
        .unwrap();

    let author = user_with("author", 1, RolePermission::SendMessages);
    let recipient = User::new(ObjectId::new(), "recipient");
    h.store.seed_as(Collection::Users, &recipient).unwrap();
    let message = Message::new(ObjectId::new(), author.id, MessageDataInbox::default());
    let mut mb = MessageBuilder::new(message);
    h.mutator
        .send_inbox_message(
            &author,
            &mut mb,
            SendInboxOptions {
                recipients: vec![recipient.id],
                consider_blocked_users: false,
            },
        )
        .await
        .unwrap();
    let inbox_id = mb.snapshot().id;

    let reports_only = user_with("reports", 5, RolePermission::ManageReports);
    let out = h
        .mutator
        .set_message_read_states(
            &reports_only,
            SetReadStatesOptions {
                message_ids: vec![request_id],
                read: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(out.updated, 0);
    assert_eq!(out.errors.len(), 1);

    let emote_mod = user_with("emote-mod", 5, RolePermission::EditAnyEmote);
    let out = h
        .mutator
        .set_message_read_states(
            &emote_mod,
            SetReadStatesOptions {
                message_ids: vec![request_id, inbox_id, ObjectId::new()],
                read: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(out.updated, 1);
    assert_eq!(out.errors.len(), 2);
    assert!(out.errors.iter().any(|e| matches!(e, AppError::UnknownMessage(_))));
    assert!(out.errors.iter().any(|e| matches!(e, AppError::InsufficientPrivilege(_))));

    let reads: Vec<MessageRead> = h.store.all_as(Collection::MessagesRead).unwrap();
    let request_row = reads.iter().find(|r| r.message_id == request_id).unwrap();
    assert!(request_row.read);
    assert_eq!(request_row.recipient_id, ZERO_ID);
    assert!(!reads.iter().find(|r| r.message_id == inbox_id).unwrap().read);
}

#[tokio::test]
async fn test_emote_version_delete_and_restore() {
    let h = harness();
    let owner = User::new(ObjectId::new(), "owner");
    let mut emote = Emote::new(ObjectId::new(), owner.id, "Wave");
    emote.versions[0].image_files.push(image("emote/v1/1x.webp"));
    let mut second = EmoteVersion::new(ObjectId::new(), "v2");
    second.state.lifecycle = EmoteLifecycle::Live;
    second.image_files.push(image("emote/v2/1x.webp"));
    let second_id = second.id;
    emote.versions.push(second);
    h.store.seed_as(Collection::Emotes, &emote).unwrap();
    let bucket = StorageConfig::default().bucket;

    let stranger = User::new(ObjectId::new(), "stranger");
    let mut b = EmoteBuilder::new(emote.clone());
    assert!(matches!(
        h.mutator.delete_emote(&stranger, &mut b, DeleteEmoteOptions::default()).await,
        Err(AppError::InsufficientPrivilege(_))
    ));

    let mut b = EmoteBuilder::new(emote.clone());
    h.mutator
        .delete_emote(
            &owner,
            &mut b,
            DeleteEmoteOptions {
                version_id: Some(second_id),
                reason: "old version".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let stored: Vec<Emote> = h.store.all_as(Collection::Emotes).unwrap();
    assert_eq!(stored[0].versions[0].state.lifecycle, EmoteLifecycle::Live);
    assert_eq!(stored[0].versions[1].state.lifecycle, EmoteLifecycle::Deleted);
    assert_eq!(stored[0].state.lifecycle, EmoteLifecycle::Live);
    assert_eq!(h.storage.acl(&bucket, "emote/v2/1x.webp"), Some(ObjectAcl::Private));
    assert_eq!(h.storage.acl(&bucket, "emote/v1/1x.webp"), None);

    let mut b = EmoteBuilder::new(stored[0].clone());
    h.mutator
        .delete_emote(
            &owner,
            &mut b,
            DeleteEmoteOptions {
                undo: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let stored: Vec<Emote> = h.store.all_as(Collection::Emotes).unwrap();
    assert!(stored[0].versions.iter().all(|v| v.state.lifecycle == EmoteLifecycle::Live));
    assert_eq!(h.storage.acl(&bucket, "emote/v1/1x.webp"), Some(ObjectAcl::PublicRead));
    assert_eq!(h.storage.acl(&bucket, "emote/v2/1x.webp"), Some(ObjectAcl::PublicRead));
    assert_eq!(h.store.len(Collection::AuditLogs), 2);
}

#[tokio::test]
async fn test_editor_permissions_and_self_removal() {
    let h = harness();
    let helper = User::new(ObjectId::new(), "helper");
    let manager = User::new(ObjectId::new(), "manager");
    let newcomer = User::new(ObjectId::new(), "newcomer");
    let stranger = User::new(ObjectId::new(), "stranger");
    h.store.seed_as(Collection::Users, &newcomer).unwrap();
    let mut channel = User::new(ObjectId::new(), "channel");
    channel
        .editors
        .push(UserEditor::new(helper.id, UserEditorPermission::ModifyEmotes, true));
    channel
        .editors
        .push(UserEditor::new(manager.id, UserEditorPermission::ManageEditors, true));
    h.store.seed_as(Collection::Users, &channel).unwrap();

    let add_newcomer = EditorChange {
        editor_id: newcomer.id,
        permissions: UserEditorPermission::ModifyEmotes,
        visible: true,
        action: ListItemAction::Add,
    };
    let mut b = UserBuilder::new(channel.clone());
    assert!(matches!(
        h.mutator.modify_user_editors(&stranger, &mut b, add_newcomer.clone()).await,
        Err(AppError::InsufficientPrivilege(_))
    ));
    let mut b = UserBuilder::new(channel.clone());
    assert!(matches!(
        h.mutator.modify_user_editors(&helper, &mut b, add_newcomer.clone()).await,
        Err(AppError::InsufficientPrivilege(_))
    ));

    let mut b = UserBuilder::new(channel.clone());
    h.mutator
        .modify_user_editors(&manager, &mut b, add_newcomer)
        .await
        .unwrap();

    let stored: Vec<User> = h.store.all_as(Collection::Users).unwrap();
    let current = stored.into_iter().find(|u| u.id == channel.id).unwrap();
    assert_eq!(current.editors.len(), 3);

    let mut b = UserBuilder::new(current);
    h.mutator
        .modify_user_editors(
            &helper,
            &mut b,
            EditorChange {
                editor_id: helper.id,
                permissions: UserEditorPermission::none(),
                visible: false,
                action: ListItemAction::Remove,
            },
        )
        .await
        .unwrap();

    let stored: Vec<User> = h.store.all_as(Collection::Users).unwrap();
    let current = stored.into_iter().find(|u| u.id == channel.id).unwrap();
    let ids: Vec<ObjectId> = current.editors.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![manager.id, newcomer.id]);
}

#[tokio::test]
async fn test_failed_editor_write_is_rolled_back() {
    let h = harness();
    let newcomer = User::new(ObjectId::new(), "newcomer");
    h.store.seed_as(Collection::Users, &newcomer).unwrap();
    let channel = User::new(ObjectId::new(), "channel");
    h.store.seed_as(Collection::Users, &channel).unwrap();
    h.store.fail_writes(Collection::Users);

    let mut b = UserBuilder::new(channel.clone());
    let result = h
        .mutator
        .modify_user_editors(
            &channel,
            &mut b,
            EditorChange {
                editor_id: newcomer.id,
                permissions: UserEditorPermission::ModifyEmotes,
                visible: true,
                action: ListItemAction::Add,
            },
        )
        .await;
    assert!(result.is_err());
    assert!(b.snapshot().editors.is_empty());
    assert!(b.update().is_empty());
    assert!(b.ensure_usable().is_ok());
}

#[tokio::test]
async fn test_active_emote_set_authorization() {
    let h = harness();
    let helper = User::new(ObjectId::new(), "helper");
    let stranger = User::new(ObjectId::new(), "stranger");
    let mut channel = User::new(ObjectId::new(), "channel");
    channel.connections.push(twitch("twitch-1"));
    channel
        .editors
        .push(UserEditor::new(helper.id, UserEditorPermission::ModifyEmotes, true));
    h.store.seed_as(Collection::Users, &channel).unwrap();

    let own_set = EmoteSet::new(ObjectId::new(), channel.id, "Main", 10);
    let helper_set = EmoteSet::new(ObjectId::new(), helper.id, "Helper's", 10);
    h.store.seed_as(Collection::EmoteSets, &own_set).unwrap();
    h.store.seed_as(Collection::EmoteSets, &helper_set).unwrap();

    let activate = |set_id: ObjectId| SetActiveEmoteSetOptions {
        connection_id: "twitch-1".into(),
        emote_set_id: Some(set_id),
    };

    let mut b = UserBuilder::new(channel.clone());
    assert!(matches!(
        h.mutator.set_user_active_emote_set(&stranger, &mut b, activate(own_set.id)).await,
        Err(AppError::InsufficientPrivilege(_))
    ));

    let mut b = UserBuilder::new(channel.clone());
    assert!(matches!(
        h.mutator.set_user_active_emote_set(&helper, &mut b, activate(own_set.id)).await,
        Err(AppError::InsufficientPrivilege(_))
    ));

    let mut b = UserBuilder::new(channel.clone());
    assert!(matches!(
        h.mutator.set_user_active_emote_set(&channel, &mut b, activate(ObjectId::new())).await,
        Err(AppError::UnknownEmoteSet(_))
    ));

    let mut b = UserBuilder::new(channel.clone());
    h.mutator
        .set_user_active_emote_set(&helper, &mut b, activate(helper_set.id))
        .await
        .unwrap();

    let mut b = UserBuilder::new(b.into_snapshot());
    h.mutator
        .set_user_active_emote_set(&channel, &mut b, activate(own_set.id))
        .await
        .unwrap();

    let stored: Vec<User> = h.store.all_as(Collection::Users).unwrap();
    assert_eq!(stored[0].connections[0].emote_set_id, Some(own_set.id));
}
