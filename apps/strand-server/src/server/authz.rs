//! Pure authorization predicates. Callers pass in already-fetched
//! entities; nothing here touches storage.

use super::{
    core::{ChannelRecord, MessageRecord},
    types::Principal,
};

pub(crate) fn is_member(principal: &Principal, channel: &ChannelRecord) -> bool {
    channel
        .members
        .iter()
        .any(|member| member.id == principal.id)
}

pub(crate) fn is_creator(principal: &Principal, creator: &Principal) -> bool {
    principal.id == creator.id
}

/// A public channel is viewable by anyone; a private channel only by
/// its creator and members.
pub(crate) fn can_view(principal: &Principal, channel: &ChannelRecord) -> bool {
    !channel.private || is_creator(principal, &channel.creator) || is_member(principal, channel)
}

pub(crate) fn can_mutate_channel(principal: &Principal, channel: &ChannelRecord) -> bool {
    is_creator(principal, &channel.creator)
}

pub(crate) fn can_mutate_message(principal: &Principal, message: &MessageRecord) -> bool {
    is_creator(principal, &message.creator)
}

#[cfg(test)]
mod tests {
    use super::{can_mutate_channel, can_mutate_message, can_view, is_creator, is_member};
    use crate::server::{
        core::{ChannelRecord, MessageRecord},
        types::Principal,
    };

    fn principal(id: i64) -> Principal {
        Principal {
            id,
            user_name: format!("user_{id}"),
            first_name: String::from("Test"),
            last_name: String::from("User"),
            photo_url: String::new(),
        }
    }

    fn channel(private: bool, creator_id: i64, member_ids: &[i64]) -> ChannelRecord {
        ChannelRecord {
            channel_id: String::from("chan-1"),
            name: String::from("general"),
            description: None,
            private,
            members: member_ids.iter().copied().map(principal).collect(),
            creator: principal(creator_id),
            created_at_unix: 1,
            edited_at_unix: None,
        }
    }

    #[test]
    fn public_channels_are_viewable_by_anyone() {
        let channel = channel(false, 1, &[]);
        assert!(can_view(&principal(99), &channel));
    }

    #[test]
    fn private_channels_are_restricted_to_creator_and_members() {
        let channel = channel(true, 1, &[2]);
        assert!(can_view(&principal(1), &channel));
        assert!(can_view(&principal(2), &channel));
        assert!(!can_view(&principal(3), &channel));
    }

    #[test]
    fn membership_is_by_identifier_only() {
        let mut channel = channel(true, 1, &[2]);
        channel.members[0].user_name = String::from("renamed");
        assert!(is_member(&principal(2), &channel));
        assert!(!is_member(&principal(4), &channel));
    }

    #[test]
    fn only_the_creator_can_mutate_a_channel() {
        let channel = channel(false, 1, &[2]);
        assert!(can_mutate_channel(&principal(1), &channel));
        assert!(!can_mutate_channel(&principal(2), &channel));
    }

    #[test]
    fn only_the_creator_can_mutate_a_message() {
        let message = MessageRecord {
            message_id: String::from("msg-1"),
            channel_id: String::from("chan-1"),
            body: String::from("hi"),
            creator: principal(7),
            created_at_unix: 1,
            edited_at_unix: None,
        };
        assert!(can_mutate_message(&principal(7), &message));
        assert!(!can_mutate_message(&principal(8), &message));
        assert!(is_creator(&principal(7), &message.creator));
    }
}
