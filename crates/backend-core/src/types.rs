use serde::{Deserialize, Serialize};

/// High-level client lifecycle state reported to the frontend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientLifecycleState {
    /// No authenticated session; only auth commands are accepted.
    SignedOut,
    /// A sign-in flow is currently running.
    Authenticating,
    /// A recovery-token redemption flow is currently running.
    Recovering,
    /// Session obtained from a password-reset link; only `UpdatePassword`
    /// and `SignOut` are meaningful here.
    PasswordRecovery,
    /// Signed in and ready for marketplace and chat commands.
    Authenticated,
    /// Client entered unrecoverable fatal state.
    Fatal,
}

/// Marketplace role carried by a profile row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Demand side: posts service requests and accepts offers.
    Customer,
    /// Supply side: a tradesperson who browses requests and submits offers.
    Fachman,
}

/// Lifecycle status of a service request (poptávka).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Accepting offers.
    Open,
    /// An offer was accepted; work is underway.
    InProgress,
    /// Work finished and reviewed.
    Completed,
}

/// Status of an offer (nabídka) submitted against a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    /// Awaiting the customer's decision.
    Pending,
    /// Chosen by the customer.
    Accepted,
    /// Passed over when a sibling offer was accepted.
    Declined,
}

/// Reason a notification row was produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A chat message addressed to the recipient was created.
    NewMessage,
    /// A new offer landed on one of the recipient's requests.
    NewOffer,
    /// One of the recipient's offers was accepted.
    OfferAccepted,
}

/// User profile stored in the `profiles` collection.
///
/// The profile ID equals the auth user ID, so auth results can be joined
/// against profiles without an extra lookup table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    /// Profile ID.
    pub id: String,
    /// Display name shown to counterparts.
    pub full_name: String,
    /// Marketplace role.
    pub role: UserRole,
    /// Whether a provider passed verification. Always `false` for customers.
    pub verified: bool,
    /// Creation timestamp in milliseconds since Unix epoch.
    pub created_at_ms: u64,
}

/// Service category stored in the `categories` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    /// Category ID.
    pub id: String,
    /// Human-readable category name.
    pub name: String,
}

/// Customer-posted service request stored in the `requests` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceRequest {
    /// Request ID.
    pub id: String,
    /// Profile ID of the posting customer.
    pub customer_id: String,
    /// Category the request belongs to.
    pub category_id: String,
    /// Short request title.
    pub title: String,
    /// Longer free-form description of the work.
    pub description: String,
    /// Current lifecycle status.
    pub status: RequestStatus,
    /// Creation timestamp in milliseconds since Unix epoch.
    pub created_at_ms: u64,
}

/// Provider offer stored in the `offers` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Offer {
    /// Offer ID.
    pub id: String,
    /// Request the offer targets.
    pub request_id: String,
    /// Profile ID of the offering provider.
    pub fachman_id: String,
    /// Quoted price in CZK.
    pub price_czk: i64,
    /// Free-form pitch accompanying the quote.
    pub message: String,
    /// Current offer status.
    pub status: OfferStatus,
    /// Creation timestamp in milliseconds since Unix epoch.
    pub created_at_ms: u64,
}

/// Direct message stored in the `messages` collection.
///
/// Immutable once created except for the one-way `is_read` flip. Every
/// message is scoped to exactly one request and travels between two
/// distinct profiles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// Message ID.
    pub id: String,
    /// Request the conversation is scoped to.
    pub request_id: String,
    /// Profile ID of the sender.
    pub sender_id: String,
    /// Profile ID of the receiver.
    pub receiver_id: String,
    /// Message text.
    pub body: String,
    /// Whether the receiver has seen the message.
    pub is_read: bool,
    /// Creation timestamp in milliseconds since Unix epoch.
    pub created_at_ms: u64,
}

/// Review stored in the `reviews` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Review {
    /// Review ID.
    pub id: String,
    /// Request the review concludes.
    pub request_id: String,
    /// Profile ID of the reviewed provider.
    pub fachman_id: String,
    /// Profile ID of the reviewing customer.
    pub reviewer_id: String,
    /// Star rating, `1..=5`.
    pub rating: u8,
    /// Free-form review text.
    pub comment: String,
    /// Creation timestamp in milliseconds since Unix epoch.
    pub created_at_ms: u64,
}

/// Notification stored in the `notifications` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    /// Notification ID.
    pub id: String,
    /// Profile ID of the recipient.
    pub user_id: String,
    /// What produced the notification.
    pub kind: NotificationKind,
    /// Display-ready notification text.
    pub body: String,
    /// Whether the recipient has seen the notification.
    pub is_read: bool,
    /// Creation timestamp in milliseconds since Unix epoch.
    pub created_at_ms: u64,
}

/// Derived conversation thread shown in the inbox.
///
/// Never persisted; recomputed from the viewer's messages on each
/// `ListConversations`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSummary {
    /// Request the thread is scoped to.
    pub request_id: String,
    /// Profile ID of the other participant.
    pub counterpart_id: String,
    /// Display name of the counterpart, or a placeholder when the profile
    /// is missing.
    pub counterpart_name: String,
    /// Title of the request, or a placeholder when the request is missing.
    pub request_title: String,
    /// Body of the most recent message in the thread.
    pub last_message: String,
    /// Timestamp of the most recent message, milliseconds since Unix epoch.
    pub last_message_at_ms: u64,
    /// Messages addressed to the viewer that are still unread.
    pub unread_count: u64,
}

/// Which listing a `RequestList` event carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestScope {
    /// All open requests, for providers browsing work.
    Open,
    /// The viewer's own requests, any status.
    Mine,
}

/// Command channel input accepted by the client runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientCommand {
    /// Sign in with email and password.
    SignIn {
        /// Account email.
        email: String,
        /// Account password.
        password: String,
    },
    /// Sign out and discard the platform session.
    SignOut,
    /// Request a password-reset email for an account.
    ResetPassword {
        /// Account email.
        email: String,
    },
    /// Redeem a recovery token from a reset email into a session.
    RecoverSession {
        /// Single-use token carried by the reset email link.
        recovery_token: String,
    },
    /// Set a new password for the current session.
    UpdatePassword {
        /// New password.
        new_password: String,
        /// Confirmation repeat; must match `new_password`.
        confirm: String,
    },
    /// Emit the viewer's current profile.
    LoadProfile,
    /// Emit the category list.
    ListCategories,
    /// Post a new service request (customer role).
    PostRequest {
        /// Request title.
        title: String,
        /// Work description.
        description: String,
        /// Category the request belongs to.
        category_id: String,
    },
    /// List open requests, optionally narrowed to one category.
    ListOpenRequests {
        /// Optional category narrowing.
        category_id: Option<String>,
    },
    /// List the viewer's own requests, any status.
    ListMyRequests,
    /// Submit an offer against an open request (verified provider role).
    SubmitOffer {
        /// Target request.
        request_id: String,
        /// Quoted price in CZK.
        price_czk: i64,
        /// Free-form pitch.
        message: String,
    },
    /// List offers on one of the viewer's requests.
    ListOffers {
        /// Target request.
        request_id: String,
    },
    /// Accept one offer; pending siblings are declined and the request
    /// moves to `InProgress`.
    AcceptOffer {
        /// Offer to accept.
        offer_id: String,
    },
    /// Review the provider who worked a request (request owner only).
    SubmitReview {
        /// Reviewed request.
        request_id: String,
        /// Star rating, `1..=5`.
        rating: u8,
        /// Free-form review text.
        comment: String,
    },
    /// List reviews received by a provider.
    ListReviews {
        /// Reviewed provider.
        fachman_id: String,
    },
    /// Recompute and emit the viewer's conversation threads.
    ListConversations,
    /// Open a chat with one counterpart scoped to one request.
    OpenChat {
        /// Request the conversation is scoped to.
        request_id: String,
        /// The other participant.
        counterpart_id: String,
    },
    /// Send a message in the open chat.
    SendChatMessage {
        /// Frontend-provided transaction ID echoed in `SendAck`.
        client_txn_id: String,
        /// Message text.
        body: String,
    },
    /// Mark incoming messages in the open chat as read (idempotent).
    MarkChatRead,
    /// Close the open chat and release its live subscription.
    CloseChat,
    /// Emit the viewer's notifications, newest first.
    ListNotifications,
    /// Mark all of the viewer's unread notifications as read.
    MarkNotificationsRead,
}

/// Acknowledgement for `SendChatMessage`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendAck {
    /// Original frontend transaction ID.
    pub client_txn_id: String,
    /// Stored message ID on success.
    pub message_id: Option<String>,
    /// Stable client error code on failure.
    pub error_code: Option<String>,
}

/// Event channel output emitted by the client runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClientEvent {
    /// Client lifecycle transition.
    StateChanged {
        /// New lifecycle state.
        state: ClientLifecycleState,
    },
    /// Result of a sign-in or recovery flow.
    AuthResult {
        /// `true` when the flow completed successfully.
        success: bool,
        /// Stable client error code when `success == false`.
        error_code: Option<String>,
    },
    /// A password-reset email was requested.
    ResetEmailSent {
        /// Email the reset was requested for.
        email: String,
    },
    /// The session password was changed.
    PasswordUpdated,
    /// The viewer's profile.
    ProfileLoaded {
        /// Current profile row.
        profile: Profile,
    },
    /// Category listing.
    CategoryList {
        /// All categories, name order.
        categories: Vec<Category>,
    },
    /// A request was posted by the viewer.
    RequestPosted {
        /// Stored request row.
        request: ServiceRequest,
    },
    /// Request listing.
    RequestList {
        /// Which listing this is.
        scope: RequestScope,
        /// Requests, newest first.
        requests: Vec<ServiceRequest>,
    },
    /// An offer was submitted by the viewer.
    OfferSubmitted {
        /// Stored offer row.
        offer: Offer,
    },
    /// Offer listing for one request.
    OfferList {
        /// Request the offers target.
        request_id: String,
        /// Offers, newest first.
        offers: Vec<Offer>,
    },
    /// An offer was accepted by the viewer.
    OfferAccepted {
        /// The accepted offer after its status change.
        offer: Offer,
    },
    /// A review was submitted by the viewer.
    ReviewSubmitted {
        /// Stored review row.
        review: Review,
    },
    /// Review listing for one provider.
    ReviewList {
        /// Reviewed provider.
        fachman_id: String,
        /// Reviews, newest first.
        reviews: Vec<Review>,
        /// Mean rating across `reviews`, when any exist.
        average_rating: Option<f32>,
    },
    /// Conversation threads derived from the viewer's messages.
    ConversationList {
        /// Threads ordered by recency of their newest message.
        conversations: Vec<ConversationSummary>,
    },
    /// Chat history snapshot, emitted on open and after a feed resync.
    ChatOpened {
        /// Request the conversation is scoped to.
        request_id: String,
        /// The other participant.
        counterpart_id: String,
        /// History ascending by creation time.
        messages: Vec<ChatMessage>,
    },
    /// One message appended to the open chat (own echo or live arrival).
    ChatAppended {
        /// The appended message.
        message: ChatMessage,
    },
    /// Result of an explicit `MarkChatRead`.
    ChatRead {
        /// How many messages changed from unread to read.
        marked: u64,
    },
    /// The open chat was closed and its subscription released.
    ChatClosed,
    /// Send acknowledgement for `SendChatMessage`.
    SendAck(SendAck),
    /// Notification listing.
    NotificationList {
        /// The viewer's notifications, newest first.
        notifications: Vec<Notification>,
    },
    /// Result of `MarkNotificationsRead`.
    NotificationsRead {
        /// How many notifications changed from unread to read.
        marked: u64,
    },
    /// A command failed. For store failures the message carries the
    /// platform's error text verbatim.
    OperationFailed {
        /// Stable client error code.
        code: String,
        /// Human-readable error message.
        message: String,
        /// Indicates whether retrying may recover.
        recoverable: bool,
    },
}

impl UserRole {
    /// Stored string form, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Customer => "customer",
            UserRole::Fachman => "fachman",
        }
    }
}

impl RequestStatus {
    /// Stored string form, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Open => "open",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
        }
    }
}

impl OfferStatus {
    /// Stored string form, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Declined => "declined",
        }
    }
}

impl NotificationKind {
    /// Stored string form, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NewMessage => "new_message",
            NotificationKind::NewOffer => "new_offer",
            NotificationKind::OfferAccepted => "offer_accepted",
        }
    }
}

impl ChatMessage {
    /// Whether this message travels between `a` and `b` (either direction)
    /// within `request_id`.
    pub fn is_between(&self, request_id: &str, a: &str, b: &str) -> bool {
        self.request_id == request_id
            && ((self.sender_id == a && self.receiver_id == b)
                || (self.sender_id == b && self.receiver_id == a))
    }

    /// Whether this message is addressed to `viewer` and still unread.
    pub fn is_unread_for(&self, viewer: &str) -> bool {
        self.receiver_id == viewer && !self.is_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(sender: &str, receiver: &str, request: &str) -> ChatMessage {
        ChatMessage {
            id: "m-1".to_owned(),
            request_id: request.to_owned(),
            sender_id: sender.to_owned(),
            receiver_id: receiver.to_owned(),
            body: "Dobrý den".to_owned(),
            is_read: false,
            created_at_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn matches_pair_in_both_directions() {
        let m = message("alice", "bob", "r-1");
        assert!(m.is_between("r-1", "alice", "bob"));
        assert!(m.is_between("r-1", "bob", "alice"));
        assert!(!m.is_between("r-2", "alice", "bob"));
        assert!(!m.is_between("r-1", "alice", "carol"));
    }

    #[test]
    fn unread_check_is_receiver_scoped() {
        let mut m = message("alice", "bob", "r-1");
        assert!(m.is_unread_for("bob"));
        assert!(!m.is_unread_for("alice"));

        m.is_read = true;
        assert!(!m.is_unread_for("bob"));
    }

    #[test]
    fn role_and_status_tags_are_snake_case() {
        assert_eq!(
            serde_json::to_value(UserRole::Fachman).expect("serialize role"),
            serde_json::json!("fachman")
        );
        assert_eq!(
            serde_json::to_value(RequestStatus::InProgress).expect("serialize status"),
            serde_json::json!("in_progress")
        );
        assert_eq!(
            serde_json::to_value(NotificationKind::OfferAccepted).expect("serialize kind"),
            serde_json::json!("offer_accepted")
        );
    }

    #[test]
    fn string_form_matches_serde_representation() {
        for role in [UserRole::Customer, UserRole::Fachman] {
            assert_eq!(
                serde_json::to_value(role).expect("serialize role"),
                serde_json::json!(role.as_str())
            );
        }
        for status in [
            RequestStatus::Open,
            RequestStatus::InProgress,
            RequestStatus::Completed,
        ] {
            assert_eq!(
                serde_json::to_value(status).expect("serialize status"),
                serde_json::json!(status.as_str())
            );
        }
        for status in [
            OfferStatus::Pending,
            OfferStatus::Accepted,
            OfferStatus::Declined,
        ] {
            assert_eq!(
                serde_json::to_value(status).expect("serialize status"),
                serde_json::json!(status.as_str())
            );
        }
        for kind in [
            NotificationKind::NewMessage,
            NotificationKind::NewOffer,
            NotificationKind::OfferAccepted,
        ] {
            assert_eq!(
                serde_json::to_value(kind).expect("serialize kind"),
                serde_json::json!(kind.as_str())
            );
        }
    }
}
