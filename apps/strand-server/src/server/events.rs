use super::core::ChannelRecord;

/// Recipient list attached to every outbound event. Private channels
/// target their member ids; public channels use the empty broadcast
/// list.
pub(crate) fn recipients(channel: &ChannelRecord) -> Vec<String> {
    if channel.private {
        channel
            .members
            .iter()
            .map(|member| member.id.to_string())
            .collect()
    } else {
        Vec::new()
    }
}
