use std::collections::HashMap;

use crate::types::{ChatMessage, ConversationSummary};

/// Inbox label shown when a thread's request row no longer resolves.
pub const UNKNOWN_REQUEST_TITLE: &str = "Neznámá poptávka";

/// Inbox label shown when a counterpart's profile row no longer resolves.
pub const UNKNOWN_USER_NAME: &str = "Neznámý uživatel";

/// Group the viewer's messages into conversation threads.
///
/// `messages` must be ordered newest first; the first message encountered
/// for a `(request, counterpart)` pair becomes the thread's representative,
/// so threads come out ordered by the recency of their newest message.
/// Messages not involving the viewer are skipped. Threads whose request or
/// counterpart profile is missing from the lookup maps get placeholder
/// labels instead of being dropped.
pub fn aggregate_conversations(
    viewer_id: &str,
    messages: &[ChatMessage],
    request_titles: &HashMap<String, String>,
    profile_names: &HashMap<String, String>,
) -> Vec<ConversationSummary> {
    let mut threads: Vec<ConversationSummary> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for message in messages {
        let counterpart = if message.sender_id == viewer_id {
            message.receiver_id.as_str()
        } else if message.receiver_id == viewer_id {
            message.sender_id.as_str()
        } else {
            continue;
        };

        let key = (message.request_id.clone(), counterpart.to_owned());
        let slot = *index.entry(key).or_insert_with(|| {
            threads.push(ConversationSummary {
                request_id: message.request_id.clone(),
                counterpart_id: counterpart.to_owned(),
                counterpart_name: profile_names
                    .get(counterpart)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_USER_NAME.to_owned()),
                request_title: request_titles
                    .get(&message.request_id)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_REQUEST_TITLE.to_owned()),
                last_message: message.body.clone(),
                last_message_at_ms: message.created_at_ms,
                unread_count: 0,
            });
            threads.len() - 1
        });

        if message.is_unread_for(viewer_id) {
            threads[slot].unread_count += 1;
        }
    }

    threads
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(
        id: &str,
        request: &str,
        sender: &str,
        receiver: &str,
        is_read: bool,
        at: u64,
    ) -> ChatMessage {
        ChatMessage {
            id: id.to_owned(),
            request_id: request.to_owned(),
            sender_id: sender.to_owned(),
            receiver_id: receiver.to_owned(),
            body: format!("zprava {id}"),
            is_read,
            created_at_ms: at,
        }
    }

    fn titles(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn groups_by_request_and_counterpart_pair() {
        // v talks to a about r1 (two unread incoming) and to b about r2
        // (one read incoming). Newest first.
        let messages = vec![
            message("m-4", "r1", "a", "v", false, 400),
            message("m-3", "r1", "a", "v", false, 300),
            message("m-2", "r2", "b", "v", true, 200),
            message("m-1", "r1", "v", "a", false, 100),
        ];
        let request_titles = titles(&[("r1", "Oprava kohoutku"), ("r2", "Malování bytu")]);
        let profile_names = titles(&[("a", "Adam"), ("b", "Blanka")]);

        let threads =
            aggregate_conversations("v", &messages, &request_titles, &profile_names);

        assert_eq!(threads.len(), 2);

        assert_eq!(threads[0].request_id, "r1");
        assert_eq!(threads[0].counterpart_id, "a");
        assert_eq!(threads[0].counterpart_name, "Adam");
        assert_eq!(threads[0].request_title, "Oprava kohoutku");
        assert_eq!(threads[0].last_message, "zprava m-4");
        assert_eq!(threads[0].last_message_at_ms, 400);
        assert_eq!(threads[0].unread_count, 2);

        assert_eq!(threads[1].request_id, "r2");
        assert_eq!(threads[1].counterpart_id, "b");
        assert_eq!(threads[1].unread_count, 0);
    }

    #[test]
    fn same_counterpart_across_requests_yields_separate_threads() {
        let messages = vec![
            message("m-2", "r2", "a", "v", false, 200),
            message("m-1", "r1", "a", "v", false, 100),
        ];

        let threads = aggregate_conversations(
            "v",
            &messages,
            &titles(&[("r1", "Jedna"), ("r2", "Dva")]),
            &titles(&[("a", "Adam")]),
        );

        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].request_id, "r2");
        assert_eq!(threads[1].request_id, "r1");
    }

    #[test]
    fn outgoing_unread_messages_do_not_count() {
        // The counterpart has not read v's message yet; that is their
        // unread, not the viewer's.
        let messages = vec![message("m-1", "r1", "v", "a", false, 100)];

        let threads = aggregate_conversations(
            "v",
            &messages,
            &titles(&[("r1", "Oprava")]),
            &titles(&[("a", "Adam")]),
        );

        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].unread_count, 0);
    }

    #[test]
    fn missing_request_and_profile_fall_back_to_placeholders() {
        let messages = vec![message("m-1", "r-gone", "ghost", "v", false, 100)];

        let threads =
            aggregate_conversations("v", &messages, &HashMap::new(), &HashMap::new());

        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].request_title, UNKNOWN_REQUEST_TITLE);
        assert_eq!(threads[0].counterpart_name, UNKNOWN_USER_NAME);
    }

    #[test]
    fn messages_not_involving_the_viewer_are_skipped() {
        let messages = vec![
            message("m-2", "r1", "a", "b", false, 200),
            message("m-1", "r1", "a", "v", false, 100),
        ];

        let threads = aggregate_conversations(
            "v",
            &messages,
            &titles(&[("r1", "Oprava")]),
            &titles(&[("a", "Adam")]),
        );

        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].counterpart_id, "a");
    }

    #[test]
    fn every_message_lands_in_exactly_one_thread() {
        let messages = vec![
            message("m-5", "r2", "v", "b", false, 500),
            message("m-4", "r1", "a", "v", false, 400),
            message("m-3", "r2", "b", "v", false, 300),
            message("m-2", "r1", "v", "a", false, 200),
            message("m-1", "r1", "a", "v", true, 100),
        ];

        let threads =
            aggregate_conversations("v", &messages, &HashMap::new(), &HashMap::new());

        let total_unread: u64 = threads.iter().map(|t| t.unread_count).sum();
        assert_eq!(threads.len(), 2);
        // m-4 and m-3 are unread incoming; m-2/m-5 are outgoing, m-1 read.
        assert_eq!(total_unread, 2);
    }
}
