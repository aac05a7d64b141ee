//! Repository → channels fan-out.

use crate::config::Config;
use crate::format::{Announcement, format_announcement};
use crate::irc::{OutboundMessage, SessionManager};
use kgb_common::{Change, CommitCall};
use tracing::{debug, warn};

/// Format one authenticated commit and enqueue it for every channel its
/// repository announces to. No ordering is promised across channels.
pub fn announce(
    config: &Config,
    manager: &SessionManager,
    call: &CommitCall,
    changes: &[Change],
) -> usize {
    let channels = config.channels_for_repo(&call.repo_id);
    if channels.is_empty() {
        debug!(repo = %call.repo_id, "repository has no channels");
        return 0;
    }

    let input = Announcement {
        repo_id: &call.repo_id,
        rev_prefix: call.rev_prefix.as_deref().unwrap_or(""),
        revision: &call.revision,
        changes,
        log: &call.log,
        author: &call.author,
        branch: call.branch.as_deref(),
        module: call.module.as_deref(),
    };
    let lines = format_announcement(&input, &config.colors, channels);

    let mut delivered = 0;
    for name in channels {
        let Some(channel) = config.channel(name) else {
            warn!(channel = %name, "channel missing from config");
            continue;
        };
        let msg = OutboundMessage {
            channel: name.clone(),
            lines: lines.clone(),
        };
        if manager.dispatch(&channel.network, msg) {
            delivered += 1;
        }
    }
    debug!(
        repo = %call.repo_id,
        revision = %call.revision,
        channels = delivered,
        lines = lines.len(),
        "announcement queued"
    );
    delivered
}
