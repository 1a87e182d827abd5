//! Client runtime connecting the command/event protocol to the platform.
//!
//! [`spawn_runtime`] starts a task that owns the lifecycle state machine,
//! the authenticated session, and the single open chat. Frontends talk to
//! it exclusively through [`ClientCommand`] and [`ClientEvent`]; every
//! platform round trip goes through the [`AuthApi`]/[`StoreApi`] seams, so
//! the same runtime drives a real deployment and the in-memory platform
//! used by tests and demos.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use backend_core::{
    Category, ChatMessage, ChatSession, ClientChannelError, ClientChannels, ClientCommand,
    ClientError, ClientErrorCategory, ClientEvent, ClientStateMachine, EventStream, Notification,
    NotificationKind, Offer, OfferStatus, Profile, RequestScope, RequestStatus, ResyncBackoff,
    Review, SendOutcome, ServiceRequest, UNKNOWN_USER_NAME, UserRole, aggregate_conversations,
    normalize_operation_failure, normalize_send_outcome,
    validation::{
        validate_email, validate_message_body, validate_new_password, validate_offer_price,
        validate_rating, validate_request_fields,
    },
};
use backend_platform::{
    AuthApi, AuthSession, Filter, Patch, PlatformError, Row, SelectQuery, StoreApi, StoreChange,
    StoreEvent, Table,
};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const COMMAND_BUFFER: usize = 128;
const EVENT_BUFFER: usize = 512;
const FEED_SIGNAL_BUFFER: usize = 64;

/// Handle returned by [`spawn_runtime`], used to feed commands in and
/// subscribe to events out.
pub struct ClientRuntimeHandle {
    channels: ClientChannels,
}

impl ClientRuntimeHandle {
    pub async fn send(&self, command: ClientCommand) -> Result<(), ClientChannelError> {
        self.channels.send_command(command).await
    }

    pub fn subscribe(&self) -> EventStream {
        self.channels.subscribe()
    }
}

/// Spawn the runtime task over the given platform seams.
pub fn spawn_runtime(auth: Arc<dyn AuthApi>, store: Arc<dyn StoreApi>) -> ClientRuntimeHandle {
    let (channels, command_rx) = ClientChannels::new(COMMAND_BUFFER, EVENT_BUFFER);
    let runtime = ClientRuntime::new(channels.clone(), command_rx, auth, store);
    tokio::spawn(async move {
        runtime.run().await;
    });

    ClientRuntimeHandle { channels }
}

/// Wakeup sent by the per-chat feed task to the runtime loop.
#[derive(Debug)]
enum FeedSignal {
    /// A message for the open pair landed in the store.
    Delivery {
        request_id: String,
        counterpart_id: String,
        message: ChatMessage,
    },
    /// The feed fell behind; the session history must be reloaded.
    Resync {
        request_id: String,
        counterpart_id: String,
    },
}

struct ActiveChat {
    session: ChatSession,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

struct ClientRuntime {
    channels: ClientChannels,
    command_rx: mpsc::Receiver<ClientCommand>,
    feed_tx: mpsc::Sender<FeedSignal>,
    feed_rx: mpsc::Receiver<FeedSignal>,
    auth: Arc<dyn AuthApi>,
    store: Arc<dyn StoreApi>,
    state_machine: ClientStateMachine,
    session: Option<AuthSession>,
    viewer: Option<Profile>,
    chat: Option<ActiveChat>,
}

impl ClientRuntime {
    fn new(
        channels: ClientChannels,
        command_rx: mpsc::Receiver<ClientCommand>,
        auth: Arc<dyn AuthApi>,
        store: Arc<dyn StoreApi>,
    ) -> Self {
        let (feed_tx, feed_rx) = mpsc::channel(FEED_SIGNAL_BUFFER);
        Self {
            channels,
            command_rx,
            feed_tx,
            feed_rx,
            auth,
            store,
            state_machine: ClientStateMachine::default(),
            session: None,
            viewer: None,
            chat: None,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                maybe_command = self.command_rx.recv() => {
                    let Some(command) = maybe_command else { break };
                    if let Err(err) = self.handle_command(command).await {
                        self.channels.emit(normalize_operation_failure(err));
                    }
                }
                Some(signal) = self.feed_rx.recv() => {
                    self.handle_feed_signal(signal).await;
                }
            }
        }

        self.teardown_chat(false).await;
    }

    async fn handle_command(&mut self, command: ClientCommand) -> Result<(), ClientError> {
        match command {
            ClientCommand::SignIn { email, password } => {
                self.handle_sign_in(email, password).await;
                Ok(())
            }
            ClientCommand::SignOut => self.handle_sign_out().await,
            ClientCommand::ResetPassword { email } => self.handle_reset_password(email).await,
            ClientCommand::RecoverSession { recovery_token } => {
                self.handle_recover_session(recovery_token).await;
                Ok(())
            }
            ClientCommand::UpdatePassword {
                new_password,
                confirm,
            } => self.handle_update_password(new_password, confirm).await,
            ClientCommand::LoadProfile => self.handle_load_profile().await,
            ClientCommand::ListCategories => self.handle_list_categories().await,
            ClientCommand::PostRequest {
                title,
                description,
                category_id,
            } => self.handle_post_request(title, description, category_id).await,
            ClientCommand::ListOpenRequests { category_id } => {
                self.handle_list_open_requests(category_id).await
            }
            ClientCommand::ListMyRequests => self.handle_list_my_requests().await,
            ClientCommand::SubmitOffer {
                request_id,
                price_czk,
                message,
            } => self.handle_submit_offer(request_id, price_czk, message).await,
            ClientCommand::ListOffers { request_id } => self.handle_list_offers(request_id).await,
            ClientCommand::AcceptOffer { offer_id } => self.handle_accept_offer(offer_id).await,
            ClientCommand::SubmitReview {
                request_id,
                rating,
                comment,
            } => self.handle_submit_review(request_id, rating, comment).await,
            ClientCommand::ListReviews { fachman_id } => {
                self.handle_list_reviews(fachman_id).await
            }
            ClientCommand::ListConversations => self.handle_list_conversations().await,
            ClientCommand::OpenChat {
                request_id,
                counterpart_id,
            } => self.handle_open_chat(request_id, counterpart_id).await,
            ClientCommand::SendChatMessage {
                client_txn_id,
                body,
            } => {
                self.handle_send_chat_message(client_txn_id, body).await;
                Ok(())
            }
            ClientCommand::MarkChatRead => self.handle_mark_chat_read().await,
            ClientCommand::CloseChat => self.handle_close_chat().await,
            ClientCommand::ListNotifications => self.handle_list_notifications().await,
            ClientCommand::MarkNotificationsRead => self.handle_mark_notifications_read().await,
        }
    }

    async fn handle_sign_in(&mut self, email: String, password: String) {
        let transition = self.validate_transition(ClientCommand::SignIn {
            email: String::new(),
            password: String::new(),
        });

        let Ok((candidate, transition_events)) = transition else {
            if let Err(err) = transition {
                self.emit_auth_failure(err);
            }
            return;
        };

        self.commit_transition(candidate, transition_events);

        let auth = self.auth.clone();
        match auth.sign_in(email.trim(), &password).await {
            Ok(session) => self.complete_auth(session).await,
            Err(err) => self.finish_auth(false, Some(map_platform_error(err))),
        }
    }

    async fn handle_recover_session(&mut self, recovery_token: String) {
        let transition = self.validate_transition(ClientCommand::RecoverSession {
            recovery_token: String::new(),
        });

        let Ok((candidate, transition_events)) = transition else {
            if let Err(err) = transition {
                self.emit_auth_failure(err);
            }
            return;
        };

        self.commit_transition(candidate, transition_events);

        let auth = self.auth.clone();
        match auth.recover_session(&recovery_token).await {
            Ok(session) => self.complete_auth(session).await,
            Err(err) => self.finish_auth(false, Some(map_platform_error(err))),
        }
    }

    /// Load the viewer's profile and settle the pending auth flow.
    ///
    /// An account without a profile row cannot use the marketplace, so the
    /// fresh session is discarded and the flow fails.
    async fn complete_auth(&mut self, session: AuthSession) {
        match self.load_profile(&session.user_id).await {
            Ok(Some(profile)) => {
                self.session = Some(session);
                self.viewer = Some(profile.clone());
                self.finish_auth(true, None);
                self.channels.emit(ClientEvent::ProfileLoaded { profile });
            }
            Ok(None) => {
                let auth = self.auth.clone();
                let _ = auth.sign_out(&session.access_token).await;
                self.finish_auth(
                    false,
                    Some(ClientError::new(
                        ClientErrorCategory::Auth,
                        "profile_missing",
                        format!("no profile exists for user '{}'", session.user_id),
                    )),
                );
            }
            Err(err) => {
                let auth = self.auth.clone();
                let _ = auth.sign_out(&session.access_token).await;
                self.finish_auth(false, Some(err));
            }
        }
    }

    async fn handle_sign_out(&mut self) -> Result<(), ClientError> {
        let (candidate, transition_events) = self.validate_transition(ClientCommand::SignOut)?;

        if let Some(session) = self.session.take() {
            let auth = self.auth.clone();
            match auth.sign_out(&session.access_token).await {
                Ok(()) => {}
                // an already-dead platform session must not wedge local sign-out
                Err(PlatformError::SessionExpired) => {}
                Err(err) => {
                    self.session = Some(session);
                    return Err(map_platform_error(err));
                }
            }
        }

        self.teardown_chat(true).await;
        self.viewer = None;
        self.commit_transition(candidate, transition_events);
        Ok(())
    }

    async fn handle_reset_password(&mut self, email: String) -> Result<(), ClientError> {
        let (_candidate, _events) = self.validate_transition(ClientCommand::ResetPassword {
            email: String::new(),
        })?;
        validate_email(&email)?;
        let email = email.trim().to_owned();

        let auth = self.auth.clone();
        auth.reset_password(&email)
            .await
            .map_err(map_platform_error)?;

        self.channels.emit(ClientEvent::ResetEmailSent { email });
        Ok(())
    }

    async fn handle_update_password(
        &mut self,
        new_password: String,
        confirm: String,
    ) -> Result<(), ClientError> {
        let (_candidate, _events) = self.validate_transition(ClientCommand::UpdatePassword {
            new_password: String::new(),
            confirm: String::new(),
        })?;
        validate_new_password(&new_password, &confirm)?;

        let access_token = self.require_session()?.access_token.clone();
        let auth = self.auth.clone();
        auth.update_password(&access_token, &new_password)
            .await
            .map_err(map_platform_error)?;

        self.channels.emit(ClientEvent::PasswordUpdated);
        if let Some(event) = self.state_machine.on_password_updated() {
            self.channels.emit(event);
        }
        Ok(())
    }

    async fn handle_load_profile(&mut self) -> Result<(), ClientError> {
        let (_candidate, _events) = self.validate_transition(ClientCommand::LoadProfile)?;
        let viewer = self.require_viewer()?;

        let profile = self.load_profile(&viewer.id).await?.ok_or_else(|| {
            ClientError::new(
                ClientErrorCategory::Auth,
                "profile_missing",
                format!("no profile exists for user '{}'", viewer.id),
            )
        })?;

        self.viewer = Some(profile.clone());
        self.channels.emit(ClientEvent::ProfileLoaded { profile });
        Ok(())
    }

    async fn handle_list_categories(&mut self) -> Result<(), ClientError> {
        let (_candidate, _events) = self.validate_transition(ClientCommand::ListCategories)?;

        let rows = self
            .select_rows(SelectQuery::new(Table::Categories).order_by("name", true))
            .await?;
        let categories = rows
            .into_iter()
            .map(expect_category)
            .collect::<Result<Vec<_>, _>>()?;

        self.channels.emit(ClientEvent::CategoryList { categories });
        Ok(())
    }

    async fn handle_post_request(
        &mut self,
        title: String,
        description: String,
        category_id: String,
    ) -> Result<(), ClientError> {
        let (_candidate, _events) = self.validate_transition(ClientCommand::PostRequest {
            title: String::new(),
            description: String::new(),
            category_id: String::new(),
        })?;

        let viewer = self.require_viewer()?;
        if viewer.role != UserRole::Customer {
            return Err(ClientError::new(
                ClientErrorCategory::Auth,
                "customer_role_required",
                "only customer accounts can post requests",
            ));
        }
        validate_request_fields(&title, &description)?;

        let categories = self
            .select_rows(
                SelectQuery::new(Table::Categories)
                    .filter(Filter::eq("id", category_id.as_str()))
                    .limit(1),
            )
            .await?;
        if categories.is_empty() {
            return Err(ClientError::validation(
                "unknown_category",
                format!("category '{category_id}' does not exist"),
            ));
        }

        let stored = self
            .insert_row(Row::Request(ServiceRequest {
                id: String::new(),
                customer_id: viewer.id,
                category_id,
                title: title.trim().to_owned(),
                description: description.trim().to_owned(),
                status: RequestStatus::Open,
                created_at_ms: 0,
            }))
            .await?;
        let request = expect_request(stored)?;

        self.channels.emit(ClientEvent::RequestPosted { request });
        Ok(())
    }

    async fn handle_list_open_requests(
        &mut self,
        category_id: Option<String>,
    ) -> Result<(), ClientError> {
        let (_candidate, _events) =
            self.validate_transition(ClientCommand::ListOpenRequests { category_id: None })?;

        let mut query = SelectQuery::new(Table::Requests)
            .filter(Filter::eq("status", RequestStatus::Open.as_str()))
            .order_by("created_at_ms", false);
        if let Some(category_id) = category_id {
            query = query.filter(Filter::eq("category_id", category_id));
        }

        let rows = self.select_rows(query).await?;
        let requests = rows
            .into_iter()
            .map(expect_request)
            .collect::<Result<Vec<_>, _>>()?;

        self.channels.emit(ClientEvent::RequestList {
            scope: RequestScope::Open,
            requests,
        });
        Ok(())
    }

    async fn handle_list_my_requests(&mut self) -> Result<(), ClientError> {
        let (_candidate, _events) = self.validate_transition(ClientCommand::ListMyRequests)?;
        let viewer = self.require_viewer()?;

        let rows = self
            .select_rows(
                SelectQuery::new(Table::Requests)
                    .filter(Filter::eq("customer_id", viewer.id))
                    .order_by("created_at_ms", false),
            )
            .await?;
        let requests = rows
            .into_iter()
            .map(expect_request)
            .collect::<Result<Vec<_>, _>>()?;

        self.channels.emit(ClientEvent::RequestList {
            scope: RequestScope::Mine,
            requests,
        });
        Ok(())
    }

    async fn handle_submit_offer(
        &mut self,
        request_id: String,
        price_czk: i64,
        message: String,
    ) -> Result<(), ClientError> {
        let (_candidate, _events) = self.validate_transition(ClientCommand::SubmitOffer {
            request_id: String::new(),
            price_czk: 0,
            message: String::new(),
        })?;

        let viewer = self.require_viewer()?;
        if viewer.role != UserRole::Fachman {
            return Err(ClientError::new(
                ClientErrorCategory::Auth,
                "fachman_role_required",
                "only fachman accounts can submit offers",
            ));
        }
        if !viewer.verified {
            return Err(ClientError::new(
                ClientErrorCategory::Auth,
                "fachman_not_verified",
                "account must pass verification before submitting offers",
            ));
        }
        validate_offer_price(price_czk)?;

        let request = self.load_request(&request_id).await?.ok_or_else(|| {
            ClientError::validation(
                "unknown_request",
                format!("request '{request_id}' does not exist"),
            )
        })?;
        if request.status != RequestStatus::Open {
            return Err(ClientError::validation(
                "request_not_open",
                format!("request '{}' is no longer accepting offers", request.id),
            ));
        }

        let existing = self
            .select_rows(
                SelectQuery::new(Table::Offers)
                    .filter(Filter::eq("request_id", request.id.as_str()))
                    .filter(Filter::eq("fachman_id", viewer.id.as_str()))
                    .limit(1),
            )
            .await?;
        if !existing.is_empty() {
            return Err(ClientError::validation(
                "offer_exists",
                "an offer on this request was already submitted",
            ));
        }

        let stored = self
            .insert_row(Row::Offer(Offer {
                id: String::new(),
                request_id: request.id.clone(),
                fachman_id: viewer.id,
                price_czk,
                message: message.trim().to_owned(),
                status: OfferStatus::Pending,
                created_at_ms: 0,
            }))
            .await?;
        let offer = expect_offer(stored)?;

        self.notify(
            &request.customer_id,
            NotificationKind::NewOffer,
            format!("Nová nabídka na poptávku '{}'", request.title),
        )
        .await;
        self.channels.emit(ClientEvent::OfferSubmitted { offer });
        Ok(())
    }

    async fn handle_list_offers(&mut self, request_id: String) -> Result<(), ClientError> {
        let (_candidate, _events) = self.validate_transition(ClientCommand::ListOffers {
            request_id: String::new(),
        })?;
        let viewer = self.require_viewer()?;

        let request = self.load_request(&request_id).await?.ok_or_else(|| {
            ClientError::validation(
                "unknown_request",
                format!("request '{request_id}' does not exist"),
            )
        })?;
        if request.customer_id != viewer.id {
            return Err(ClientError::new(
                ClientErrorCategory::Auth,
                "not_request_owner",
                "only the request owner can list its offers",
            ));
        }

        let rows = self
            .select_rows(
                SelectQuery::new(Table::Offers)
                    .filter(Filter::eq("request_id", request.id.as_str()))
                    .order_by("created_at_ms", false),
            )
            .await?;
        let offers = rows
            .into_iter()
            .map(expect_offer)
            .collect::<Result<Vec<_>, _>>()?;

        self.channels.emit(ClientEvent::OfferList {
            request_id: request.id,
            offers,
        });
        Ok(())
    }

    async fn handle_accept_offer(&mut self, offer_id: String) -> Result<(), ClientError> {
        let (_candidate, _events) = self.validate_transition(ClientCommand::AcceptOffer {
            offer_id: String::new(),
        })?;
        let viewer = self.require_viewer()?;

        let offer = self.load_offer(&offer_id).await?.ok_or_else(|| {
            ClientError::validation("unknown_offer", format!("offer '{offer_id}' does not exist"))
        })?;
        let request = self.load_request(&offer.request_id).await?.ok_or_else(|| {
            ClientError::validation(
                "unknown_request",
                format!("request '{}' does not exist", offer.request_id),
            )
        })?;

        if request.customer_id != viewer.id {
            return Err(ClientError::new(
                ClientErrorCategory::Auth,
                "not_request_owner",
                "only the request owner can accept offers",
            ));
        }
        if offer.status != OfferStatus::Pending {
            return Err(ClientError::validation(
                "offer_not_pending",
                format!("offer '{}' was already resolved", offer.id),
            ));
        }
        if request.status != RequestStatus::Open {
            return Err(ClientError::validation(
                "request_not_open",
                format!("request '{}' is no longer accepting offers", request.id),
            ));
        }

        // declining siblings first keeps at most one accepted offer per request
        self.update_rows(
            Table::Offers,
            vec![
                Filter::eq("request_id", request.id.as_str()),
                Filter::neq("id", offer.id.as_str()),
                Filter::eq("status", OfferStatus::Pending.as_str()),
            ],
            Patch::new().set("status", OfferStatus::Declined.as_str()),
        )
        .await?;
        self.update_rows(
            Table::Offers,
            vec![Filter::eq("id", offer.id.as_str())],
            Patch::new().set("status", OfferStatus::Accepted.as_str()),
        )
        .await?;
        self.update_rows(
            Table::Requests,
            vec![Filter::eq("id", request.id.as_str())],
            Patch::new().set("status", RequestStatus::InProgress.as_str()),
        )
        .await?;

        self.notify(
            &offer.fachman_id,
            NotificationKind::OfferAccepted,
            format!("Vaše nabídka na poptávku '{}' byla přijata", request.title),
        )
        .await;

        let mut offer = offer;
        offer.status = OfferStatus::Accepted;
        self.channels.emit(ClientEvent::OfferAccepted { offer });
        Ok(())
    }

    async fn handle_submit_review(
        &mut self,
        request_id: String,
        rating: u8,
        comment: String,
    ) -> Result<(), ClientError> {
        let (_candidate, _events) = self.validate_transition(ClientCommand::SubmitReview {
            request_id: String::new(),
            rating: 0,
            comment: String::new(),
        })?;
        let viewer = self.require_viewer()?;
        validate_rating(rating)?;

        let request = self.load_request(&request_id).await?.ok_or_else(|| {
            ClientError::validation(
                "unknown_request",
                format!("request '{request_id}' does not exist"),
            )
        })?;
        if request.customer_id != viewer.id {
            return Err(ClientError::new(
                ClientErrorCategory::Auth,
                "not_request_owner",
                "only the request owner can review it",
            ));
        }
        if !matches!(
            request.status,
            RequestStatus::InProgress | RequestStatus::Completed
        ) {
            return Err(ClientError::validation(
                "request_not_reviewable",
                format!("request '{}' has no accepted work to review", request.id),
            ));
        }

        let accepted = self
            .select_rows(
                SelectQuery::new(Table::Offers)
                    .filter(Filter::eq("request_id", request.id.as_str()))
                    .filter(Filter::eq("status", OfferStatus::Accepted.as_str()))
                    .limit(1),
            )
            .await?
            .into_iter()
            .next()
            .map(expect_offer)
            .transpose()?
            .ok_or_else(|| {
                ClientError::validation(
                    "no_accepted_offer",
                    format!("request '{}' has no accepted offer", request.id),
                )
            })?;

        let existing = self
            .select_rows(
                SelectQuery::new(Table::Reviews)
                    .filter(Filter::eq("request_id", request.id.as_str()))
                    .limit(1),
            )
            .await?;
        if !existing.is_empty() {
            return Err(ClientError::validation(
                "review_exists",
                "this request was already reviewed",
            ));
        }

        let stored = self
            .insert_row(Row::Review(Review {
                id: String::new(),
                request_id: request.id.clone(),
                fachman_id: accepted.fachman_id,
                reviewer_id: viewer.id,
                rating,
                comment: comment.trim().to_owned(),
                created_at_ms: 0,
            }))
            .await?;
        let review = expect_review(stored)?;

        self.update_rows(
            Table::Requests,
            vec![Filter::eq("id", request.id.as_str())],
            Patch::new().set("status", RequestStatus::Completed.as_str()),
        )
        .await?;

        self.channels.emit(ClientEvent::ReviewSubmitted { review });
        Ok(())
    }

    async fn handle_list_reviews(&mut self, fachman_id: String) -> Result<(), ClientError> {
        let (_candidate, _events) = self.validate_transition(ClientCommand::ListReviews {
            fachman_id: String::new(),
        })?;

        let rows = self
            .select_rows(
                SelectQuery::new(Table::Reviews)
                    .filter(Filter::eq("fachman_id", fachman_id.as_str()))
                    .order_by("created_at_ms", false),
            )
            .await?;
        let reviews = rows
            .into_iter()
            .map(expect_review)
            .collect::<Result<Vec<_>, _>>()?;

        let average_rating = if reviews.is_empty() {
            None
        } else {
            let total: u32 = reviews.iter().map(|review| u32::from(review.rating)).sum();
            Some(total as f32 / reviews.len() as f32)
        };

        self.channels.emit(ClientEvent::ReviewList {
            fachman_id,
            reviews,
            average_rating,
        });
        Ok(())
    }

    async fn handle_list_conversations(&mut self) -> Result<(), ClientError> {
        let (_candidate, _events) = self.validate_transition(ClientCommand::ListConversations)?;
        let viewer = self.require_viewer()?;

        let rows = self
            .select_rows(
                SelectQuery::new(Table::Messages)
                    .filter(Filter::or(vec![
                        Filter::eq("sender_id", viewer.id.as_str()),
                        Filter::eq("receiver_id", viewer.id.as_str()),
                    ]))
                    .order_by("created_at_ms", false),
            )
            .await?;
        let messages = rows
            .into_iter()
            .map(expect_message)
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen_requests = HashSet::new();
        let mut request_ids = Vec::new();
        let mut seen_profiles = HashSet::new();
        let mut counterpart_ids = Vec::new();
        for message in &messages {
            if seen_requests.insert(message.request_id.as_str()) {
                request_ids.push(Value::from(message.request_id.clone()));
            }
            let counterpart = if message.sender_id == viewer.id {
                &message.receiver_id
            } else {
                &message.sender_id
            };
            if seen_profiles.insert(counterpart.as_str()) {
                counterpart_ids.push(Value::from(counterpart.clone()));
            }
        }

        let request_titles = self.load_request_titles(request_ids).await?;
        let profile_names = self.load_profile_names(counterpart_ids).await?;

        let conversations =
            aggregate_conversations(&viewer.id, &messages, &request_titles, &profile_names);
        self.channels
            .emit(ClientEvent::ConversationList { conversations });
        Ok(())
    }

    async fn handle_open_chat(
        &mut self,
        request_id: String,
        counterpart_id: String,
    ) -> Result<(), ClientError> {
        let (_candidate, _events) = self.validate_transition(ClientCommand::OpenChat {
            request_id: String::new(),
            counterpart_id: String::new(),
        })?;
        let viewer = self.require_viewer()?;
        if counterpart_id == viewer.id {
            return Err(ClientError::validation(
                "self_chat",
                "cannot open a conversation with yourself",
            ));
        }

        // opening a new pair replaces whatever was open before
        self.teardown_chat(true).await;

        let mut session =
            ChatSession::new(viewer.id, request_id.clone(), counterpart_id.clone());
        let history = self.load_chat_history(&session).await?;
        session.ready_with_history(history)?;

        let marked = self.mark_read_in_store(&session).await?;
        session.mark_incoming_read()?;
        if marked > 0 {
            debug!(request_id = %request_id, marked, "marked messages read on chat open");
        }

        let (stop, task) = self.spawn_chat_feed(&session);
        self.channels.emit(ClientEvent::ChatOpened {
            request_id,
            counterpart_id,
            messages: session.messages().to_vec(),
        });
        self.chat = Some(ActiveChat {
            session,
            stop,
            task,
        });
        Ok(())
    }

    async fn handle_send_chat_message(&mut self, client_txn_id: String, body: String) {
        let validation = self.validate_transition(ClientCommand::SendChatMessage {
            client_txn_id: String::new(),
            body: String::new(),
        });
        if let Err(err) = validation {
            self.emit_send_failure(client_txn_id, err);
            return;
        }
        if let Err(err) = validate_message_body(&body) {
            self.emit_send_failure(client_txn_id, err);
            return;
        }

        let draft = {
            let Some(chat) = self.chat.as_mut() else {
                self.emit_send_failure(client_txn_id, no_open_chat());
                return;
            };
            if let Err(err) = chat.session.begin_send() {
                self.emit_send_failure(client_txn_id, err);
                return;
            }
            ChatMessage {
                id: String::new(),
                request_id: chat.session.request_id().to_owned(),
                sender_id: chat.session.viewer_id().to_owned(),
                receiver_id: chat.session.counterpart_id().to_owned(),
                body: body.trim().to_owned(),
                is_read: false,
                created_at_ms: 0,
            }
        };
        let receiver_id = draft.receiver_id.clone();

        let insert_result = self.insert_row(Row::Message(draft)).await;
        if let Some(chat) = self.chat.as_mut() {
            chat.session.finish_send();
        }

        match insert_result.and_then(expect_message) {
            Ok(message) => {
                let appended = match self.chat.as_mut() {
                    Some(chat) => chat.session.insert(message.clone()).unwrap_or(false),
                    None => false,
                };
                // the live feed may have raced the echo in already
                if appended {
                    self.channels.emit(ClientEvent::ChatAppended {
                        message: message.clone(),
                    });
                }

                let sender_name = self
                    .viewer
                    .as_ref()
                    .map(|profile| profile.full_name.clone())
                    .unwrap_or_else(|| UNKNOWN_USER_NAME.to_owned());
                self.notify(
                    &receiver_id,
                    NotificationKind::NewMessage,
                    format!("Nová zpráva od {sender_name}"),
                )
                .await;

                self.channels.emit(normalize_send_outcome(
                    client_txn_id,
                    SendOutcome::Success {
                        message_id: message.id,
                    },
                ));
            }
            Err(err) => self.emit_send_failure(client_txn_id, err),
        }
    }

    async fn handle_mark_chat_read(&mut self) -> Result<(), ClientError> {
        let (_candidate, _events) = self.validate_transition(ClientCommand::MarkChatRead)?;

        let snapshot = {
            let chat = self.chat.as_ref().ok_or_else(no_open_chat)?;
            chat.session.clone()
        };

        let marked = self.mark_read_in_store(&snapshot).await?;
        if let Some(chat) = self.chat.as_mut() {
            chat.session.mark_incoming_read()?;
        }

        self.channels.emit(ClientEvent::ChatRead { marked });
        Ok(())
    }

    async fn handle_close_chat(&mut self) -> Result<(), ClientError> {
        let (_candidate, _events) = self.validate_transition(ClientCommand::CloseChat)?;
        if self.chat.is_none() {
            return Err(no_open_chat());
        }

        self.teardown_chat(true).await;
        Ok(())
    }

    async fn handle_list_notifications(&mut self) -> Result<(), ClientError> {
        let (_candidate, _events) = self.validate_transition(ClientCommand::ListNotifications)?;
        let viewer = self.require_viewer()?;

        let rows = self
            .select_rows(
                SelectQuery::new(Table::Notifications)
                    .filter(Filter::eq("user_id", viewer.id))
                    .order_by("created_at_ms", false),
            )
            .await?;
        let notifications = rows
            .into_iter()
            .map(expect_notification)
            .collect::<Result<Vec<_>, _>>()?;

        self.channels
            .emit(ClientEvent::NotificationList { notifications });
        Ok(())
    }

    async fn handle_mark_notifications_read(&mut self) -> Result<(), ClientError> {
        let (_candidate, _events) =
            self.validate_transition(ClientCommand::MarkNotificationsRead)?;
        let viewer = self.require_viewer()?;

        let marked = self
            .update_rows(
                Table::Notifications,
                vec![
                    Filter::eq("user_id", viewer.id),
                    Filter::eq("is_read", false),
                ],
                Patch::new().set("is_read", true),
            )
            .await?;

        self.channels.emit(ClientEvent::NotificationsRead { marked });
        Ok(())
    }

    async fn handle_feed_signal(&mut self, signal: FeedSignal) {
        match signal {
            FeedSignal::Delivery {
                request_id,
                counterpart_id,
                message,
            } => {
                self.apply_live_message(request_id, counterpart_id, message)
                    .await;
            }
            FeedSignal::Resync {
                request_id,
                counterpart_id,
            } => {
                self.resync_chat(request_id, counterpart_id).await;
            }
        }
    }

    async fn apply_live_message(
        &mut self,
        request_id: String,
        counterpart_id: String,
        message: ChatMessage,
    ) {
        let incoming = {
            let Some(chat) = self.chat.as_mut() else {
                return;
            };
            // signals queued before a close or switch must not leak through
            if chat.session.request_id() != request_id
                || chat.session.counterpart_id() != counterpart_id
            {
                return;
            }
            match chat.session.insert(message.clone()) {
                Ok(true) => message.receiver_id == chat.session.viewer_id(),
                Ok(false) | Err(_) => return,
            }
        };

        self.channels.emit(ClientEvent::ChatAppended {
            message: message.clone(),
        });

        if incoming {
            // the conversation is on screen, so the read flag flips right away
            let flip = self
                .update_rows(
                    Table::Messages,
                    vec![
                        Filter::eq("id", message.id.as_str()),
                        Filter::eq("is_read", false),
                    ],
                    Patch::new().set("is_read", true),
                )
                .await;
            match flip {
                Ok(_) => {
                    if let Some(chat) = self.chat.as_mut() {
                        let _ = chat.session.mark_incoming_read();
                    }
                }
                Err(err) => {
                    warn!(message_id = %message.id, error = %err, "failed marking live message read");
                }
            }
        }
    }

    async fn resync_chat(&mut self, request_id: String, counterpart_id: String) {
        let snapshot = {
            let Some(chat) = self.chat.as_ref() else {
                return;
            };
            if chat.session.request_id() != request_id
                || chat.session.counterpart_id() != counterpart_id
            {
                return;
            }
            chat.session.clone()
        };

        let history = match self.load_chat_history(&snapshot).await {
            Ok(history) => history,
            Err(err) => {
                self.channels.emit(normalize_operation_failure(err));
                return;
            }
        };
        if let Err(err) = self.mark_read_in_store(&snapshot).await {
            warn!(request_id = %request_id, error = %err, "failed marking messages read during resync");
        }

        if let Some(chat) = self.chat.as_mut() {
            // a close or switch may have raced the reload
            if chat.session.request_id() != request_id
                || chat.session.counterpart_id() != counterpart_id
            {
                return;
            }
            if chat.session.ready_with_history(history).is_err() {
                return;
            }
            let _ = chat.session.mark_incoming_read();
            self.channels.emit(ClientEvent::ChatOpened {
                request_id,
                counterpart_id,
                messages: chat.session.messages().to_vec(),
            });
        }
    }

    fn spawn_chat_feed(&self, session: &ChatSession) -> (CancellationToken, JoinHandle<()>) {
        let mut feed = self.store.subscribe(Table::Messages);
        let feed_tx = self.feed_tx.clone();
        let stop = CancellationToken::new();
        let stop_child = stop.child_token();
        let request_id = session.request_id().to_owned();
        let viewer_id = session.viewer_id().to_owned();
        let counterpart_id = session.counterpart_id().to_owned();

        let task = tokio::spawn(async move {
            let mut backoff = ResyncBackoff::default();
            loop {
                tokio::select! {
                    _ = stop_child.cancelled() => break,
                    event = feed.recv() => match event {
                        Ok(StoreEvent {
                            change: StoreChange::Inserted(Row::Message(message)),
                            ..
                        }) => {
                            if !message.is_between(&request_id, &viewer_id, &counterpart_id) {
                                continue;
                            }
                            backoff.reset();
                            let delivery = FeedSignal::Delivery {
                                request_id: request_id.clone(),
                                counterpart_id: counterpart_id.clone(),
                                message,
                            };
                            if feed_tx.send(delivery).await.is_err() {
                                break;
                            }
                        }
                        // read-flag updates and other rows never append
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, request_id = %request_id, "chat feed lagged; scheduling resync");
                            let delay = backoff.next_delay();
                            tokio::select! {
                                _ = stop_child.cancelled() => break,
                                _ = tokio::time::sleep(delay) => {}
                            }
                            let resync = FeedSignal::Resync {
                                request_id: request_id.clone(),
                                counterpart_id: counterpart_id.clone(),
                            };
                            if feed_tx.send(resync).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        (stop, task)
    }

    async fn teardown_chat(&mut self, emit_closed: bool) {
        let Some(mut active) = self.chat.take() else {
            return;
        };
        active.session.close();
        active.stop.cancel();
        let _ = active.task.await;

        if emit_closed {
            self.channels.emit(ClientEvent::ChatClosed);
        }
    }

    /// Store a notification row; a failure here never fails the command
    /// that produced it.
    async fn notify(&self, user_id: &str, kind: NotificationKind, body: String) {
        let result = self
            .insert_row(Row::Notification(Notification {
                id: String::new(),
                user_id: user_id.to_owned(),
                kind,
                body,
                is_read: false,
                created_at_ms: 0,
            }))
            .await;
        if let Err(err) = result {
            warn!(user_id, kind = kind.as_str(), error = %err, "failed storing notification");
        }
    }

    async fn load_profile(&self, user_id: &str) -> Result<Option<Profile>, ClientError> {
        let rows = self
            .select_rows(
                SelectQuery::new(Table::Profiles)
                    .filter(Filter::eq("id", user_id))
                    .limit(1),
            )
            .await?;
        rows.into_iter().next().map(expect_profile).transpose()
    }

    async fn load_request(&self, request_id: &str) -> Result<Option<ServiceRequest>, ClientError> {
        let rows = self
            .select_rows(
                SelectQuery::new(Table::Requests)
                    .filter(Filter::eq("id", request_id))
                    .limit(1),
            )
            .await?;
        rows.into_iter().next().map(expect_request).transpose()
    }

    async fn load_offer(&self, offer_id: &str) -> Result<Option<Offer>, ClientError> {
        let rows = self
            .select_rows(
                SelectQuery::new(Table::Offers)
                    .filter(Filter::eq("id", offer_id))
                    .limit(1),
            )
            .await?;
        rows.into_iter().next().map(expect_offer).transpose()
    }

    async fn load_request_titles(
        &self,
        ids: Vec<Value>,
    ) -> Result<HashMap<String, String>, ClientError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = self
            .select_rows(SelectQuery::new(Table::Requests).filter(Filter::is_in("id", ids)))
            .await?;

        let mut titles = HashMap::new();
        for row in rows {
            let request = expect_request(row)?;
            titles.insert(request.id, request.title);
        }
        Ok(titles)
    }

    async fn load_profile_names(
        &self,
        ids: Vec<Value>,
    ) -> Result<HashMap<String, String>, ClientError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = self
            .select_rows(SelectQuery::new(Table::Profiles).filter(Filter::is_in("id", ids)))
            .await?;

        let mut names = HashMap::new();
        for row in rows {
            let profile = expect_profile(row)?;
            names.insert(profile.id, profile.full_name);
        }
        Ok(names)
    }

    async fn load_chat_history(
        &self,
        session: &ChatSession,
    ) -> Result<Vec<ChatMessage>, ClientError> {
        let rows = self
            .select_rows(
                SelectQuery::new(Table::Messages)
                    .filter(Filter::eq("request_id", session.request_id()))
                    .filter(pair_filter(session.viewer_id(), session.counterpart_id()))
                    .order_by("created_at_ms", true),
            )
            .await?;
        rows.into_iter().map(expect_message).collect()
    }

    async fn mark_read_in_store(&self, session: &ChatSession) -> Result<u64, ClientError> {
        self.update_rows(
            Table::Messages,
            vec![
                Filter::eq("request_id", session.request_id()),
                Filter::eq("sender_id", session.counterpart_id()),
                Filter::eq("receiver_id", session.viewer_id()),
                Filter::eq("is_read", false),
            ],
            Patch::new().set("is_read", true),
        )
        .await
    }

    async fn select_rows(&self, query: SelectQuery) -> Result<Vec<Row>, ClientError> {
        let store = self.store.clone();
        store.select(query).await.map_err(map_platform_error)
    }

    async fn insert_row(&self, row: Row) -> Result<Row, ClientError> {
        let store = self.store.clone();
        store.insert(row).await.map_err(map_platform_error)
    }

    async fn update_rows(
        &self,
        table: Table,
        filters: Vec<Filter>,
        patch: Patch,
    ) -> Result<u64, ClientError> {
        let store = self.store.clone();
        store
            .update(table, filters, patch)
            .await
            .map_err(map_platform_error)
    }

    fn validate_transition(
        &self,
        command: ClientCommand,
    ) -> Result<(ClientStateMachine, Vec<ClientEvent>), ClientError> {
        let mut candidate = self.state_machine.clone();
        let events = candidate.apply(&command)?;
        Ok((candidate, events))
    }

    fn commit_transition(&mut self, candidate: ClientStateMachine, events: Vec<ClientEvent>) {
        self.state_machine = candidate;
        for event in events {
            self.channels.emit(event);
        }
    }

    fn require_session(&self) -> Result<&AuthSession, ClientError> {
        self.session.as_ref().ok_or_else(|| {
            ClientError::new(
                ClientErrorCategory::Auth,
                "session_missing",
                "no platform session is active; sign in first",
            )
        })
    }

    fn require_viewer(&self) -> Result<Profile, ClientError> {
        self.viewer.clone().ok_or_else(|| {
            ClientError::new(
                ClientErrorCategory::Auth,
                "profile_missing",
                "no viewer profile is loaded; sign in first",
            )
        })
    }

    fn finish_auth(&mut self, success: bool, error: Option<ClientError>) {
        if let Ok(state_event) = self.state_machine.on_auth_result(success) {
            self.channels.emit(state_event);
        }

        self.channels.emit(ClientEvent::AuthResult {
            success,
            error_code: error.as_ref().map(|err| err.code.clone()),
        });
    }

    fn emit_auth_failure(&self, error: ClientError) {
        self.channels.emit(ClientEvent::AuthResult {
            success: false,
            error_code: Some(error.code),
        });
    }

    fn emit_send_failure(&self, client_txn_id: String, error: ClientError) {
        self.channels.emit(normalize_send_outcome(
            client_txn_id,
            SendOutcome::Failure { error },
        ));
    }
}

fn pair_filter(a: &str, b: &str) -> Filter {
    Filter::or(vec![
        Filter::and(vec![
            Filter::eq("sender_id", a),
            Filter::eq("receiver_id", b),
        ]),
        Filter::and(vec![
            Filter::eq("sender_id", b),
            Filter::eq("receiver_id", a),
        ]),
    ])
}

fn no_open_chat() -> ClientError {
    ClientError::new(
        ClientErrorCategory::Config,
        "chat_not_open",
        "no chat session is open; send OpenChat first",
    )
}

fn map_platform_error(err: PlatformError) -> ClientError {
    let message = err.to_string();
    match err {
        PlatformError::InvalidCredentials => {
            ClientError::new(ClientErrorCategory::Auth, "invalid_credentials", message)
        }
        PlatformError::SessionExpired => {
            ClientError::new(ClientErrorCategory::Auth, "session_expired", message)
        }
        PlatformError::Conflict(_) => {
            ClientError::new(ClientErrorCategory::Storage, "conflict", message)
        }
        PlatformError::Unavailable(_) => {
            ClientError::new(ClientErrorCategory::Network, "store_unavailable", message)
        }
        PlatformError::Backend(_) => ClientError::store(message),
    }
}

fn expect_profile(row: Row) -> Result<Profile, ClientError> {
    match row {
        Row::Profile(profile) => Ok(profile),
        other => Err(unexpected_row(Table::Profiles, &other)),
    }
}

fn expect_category(row: Row) -> Result<Category, ClientError> {
    match row {
        Row::Category(category) => Ok(category),
        other => Err(unexpected_row(Table::Categories, &other)),
    }
}

fn expect_request(row: Row) -> Result<ServiceRequest, ClientError> {
    match row {
        Row::Request(request) => Ok(request),
        other => Err(unexpected_row(Table::Requests, &other)),
    }
}

fn expect_offer(row: Row) -> Result<Offer, ClientError> {
    match row {
        Row::Offer(offer) => Ok(offer),
        other => Err(unexpected_row(Table::Offers, &other)),
    }
}

fn expect_message(row: Row) -> Result<ChatMessage, ClientError> {
    match row {
        Row::Message(message) => Ok(message),
        other => Err(unexpected_row(Table::Messages, &other)),
    }
}

fn expect_review(row: Row) -> Result<Review, ClientError> {
    match row {
        Row::Review(review) => Ok(review),
        other => Err(unexpected_row(Table::Reviews, &other)),
    }
}

fn expect_notification(row: Row) -> Result<Notification, ClientError> {
    match row {
        Row::Notification(notification) => Ok(notification),
        other => Err(unexpected_row(Table::Notifications, &other)),
    }
}

fn unexpected_row(expected: Table, got: &Row) -> ClientError {
    ClientError::new(
        ClientErrorCategory::Internal,
        "unexpected_row",
        format!(
            "store returned a {} row where a {} row was expected",
            got.table(),
            expected
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use backend_core::ClientLifecycleState;
    use backend_platform::MemoryPlatform;
    use tokio::time::timeout;

    const PASSWORD: &str = "tajneheslo";
    const CUSTOMER_EMAIL: &str = "jana@example.cz";
    const CUSTOMER_ID: &str = "cust-jana";
    const FACHMAN_EMAIL: &str = "petr@example.cz";
    const FACHMAN_ID: &str = "fach-petr";

    fn profile(id: &str, name: &str, role: UserRole, verified: bool) -> Profile {
        Profile {
            id: id.to_owned(),
            full_name: name.to_owned(),
            role,
            verified,
            created_at_ms: 1,
        }
    }

    fn seeded_platform() -> Arc<MemoryPlatform> {
        let platform = Arc::new(MemoryPlatform::new());
        platform
            .seed_account(
                CUSTOMER_EMAIL,
                PASSWORD,
                profile(CUSTOMER_ID, "Jana Nováková", UserRole::Customer, false),
            )
            .expect("seed customer");
        platform
            .seed_account(
                FACHMAN_EMAIL,
                PASSWORD,
                profile(FACHMAN_ID, "Petr Svoboda", UserRole::Fachman, true),
            )
            .expect("seed fachman");
        platform
            .seed_row(Row::Category(Category {
                id: "cat-instalater".to_owned(),
                name: "Instalatérské práce".to_owned(),
            }))
            .expect("seed category");
        platform
    }

    fn client(platform: &Arc<MemoryPlatform>) -> (ClientRuntimeHandle, EventStream) {
        let handle = spawn_runtime(platform.clone(), platform.clone());
        let events = handle.subscribe();
        (handle, events)
    }

    async fn next_event(events: &mut EventStream) -> ClientEvent {
        timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event timeout")
            .expect("event receive")
    }

    async fn sign_in(
        handle: &ClientRuntimeHandle,
        events: &mut EventStream,
        email: &str,
    ) -> Profile {
        handle
            .send(ClientCommand::SignIn {
                email: email.to_owned(),
                password: PASSWORD.to_owned(),
            })
            .await
            .expect("send sign in");

        loop {
            match next_event(events).await {
                ClientEvent::AuthResult {
                    success,
                    error_code,
                } => assert!(success, "sign in failed: {error_code:?}"),
                ClientEvent::ProfileLoaded { profile } => return profile,
                _ => {}
            }
        }
    }

    async fn post_request(
        handle: &ClientRuntimeHandle,
        events: &mut EventStream,
        title: &str,
    ) -> ServiceRequest {
        handle
            .send(ClientCommand::PostRequest {
                title: title.to_owned(),
                description: "Kape voda pod dřezem".to_owned(),
                category_id: "cat-instalater".to_owned(),
            })
            .await
            .expect("send post request");

        loop {
            match next_event(events).await {
                ClientEvent::RequestPosted { request } => return request,
                ClientEvent::OperationFailed { code, message, .. } => {
                    panic!("post request failed: {code}: {message}")
                }
                _ => {}
            }
        }
    }

    async fn submit_offer(
        handle: &ClientRuntimeHandle,
        events: &mut EventStream,
        request_id: &str,
        price_czk: i64,
    ) -> Offer {
        handle
            .send(ClientCommand::SubmitOffer {
                request_id: request_id.to_owned(),
                price_czk,
                message: "Můžu přijít zítra ráno".to_owned(),
            })
            .await
            .expect("send submit offer");

        loop {
            match next_event(events).await {
                ClientEvent::OfferSubmitted { offer } => return offer,
                ClientEvent::OperationFailed { code, message, .. } => {
                    panic!("submit offer failed: {code}: {message}")
                }
                _ => {}
            }
        }
    }

    async fn accept_offer(handle: &ClientRuntimeHandle, events: &mut EventStream, offer_id: &str) {
        handle
            .send(ClientCommand::AcceptOffer {
                offer_id: offer_id.to_owned(),
            })
            .await
            .expect("send accept offer");

        loop {
            match next_event(events).await {
                ClientEvent::OfferAccepted { offer } => {
                    assert_eq!(offer.id, offer_id);
                    assert_eq!(offer.status, OfferStatus::Accepted);
                    return;
                }
                ClientEvent::OperationFailed { code, message, .. } => {
                    panic!("accept offer failed: {code}: {message}")
                }
                _ => {}
            }
        }
    }

    async fn open_chat(
        handle: &ClientRuntimeHandle,
        events: &mut EventStream,
        request_id: &str,
        counterpart_id: &str,
    ) -> Vec<ChatMessage> {
        handle
            .send(ClientCommand::OpenChat {
                request_id: request_id.to_owned(),
                counterpart_id: counterpart_id.to_owned(),
            })
            .await
            .expect("send open chat");

        loop {
            match next_event(events).await {
                ClientEvent::ChatOpened { messages, .. } => return messages,
                ClientEvent::OperationFailed { code, message, .. } => {
                    panic!("open chat failed: {code}: {message}")
                }
                _ => {}
            }
        }
    }

    async fn send_message(
        handle: &ClientRuntimeHandle,
        events: &mut EventStream,
        txn: &str,
        body: &str,
    ) -> String {
        handle
            .send(ClientCommand::SendChatMessage {
                client_txn_id: txn.to_owned(),
                body: body.to_owned(),
            })
            .await
            .expect("send chat message");

        loop {
            match next_event(events).await {
                ClientEvent::SendAck(ack) => {
                    assert_eq!(ack.client_txn_id, txn);
                    assert_eq!(ack.error_code, None, "send should succeed");
                    return ack.message_id.expect("ack should carry a message id");
                }
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn sign_in_walks_lifecycle_and_loads_profile() {
        let platform = seeded_platform();
        let (handle, mut events) = client(&platform);

        handle
            .send(ClientCommand::SignIn {
                email: CUSTOMER_EMAIL.to_owned(),
                password: PASSWORD.to_owned(),
            })
            .await
            .expect("send sign in");

        assert_eq!(
            next_event(&mut events).await,
            ClientEvent::StateChanged {
                state: ClientLifecycleState::Authenticating
            }
        );
        assert_eq!(
            next_event(&mut events).await,
            ClientEvent::StateChanged {
                state: ClientLifecycleState::Authenticated
            }
        );
        match next_event(&mut events).await {
            ClientEvent::AuthResult {
                success,
                error_code,
            } => {
                assert!(success);
                assert_eq!(error_code, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match next_event(&mut events).await {
            ClientEvent::ProfileLoaded { profile } => {
                assert_eq!(profile.id, CUSTOMER_ID);
                assert_eq!(profile.role, UserRole::Customer);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn sign_in_with_wrong_password_returns_to_signed_out() {
        let platform = seeded_platform();
        let (handle, mut events) = client(&platform);

        handle
            .send(ClientCommand::SignIn {
                email: CUSTOMER_EMAIL.to_owned(),
                password: "spatneheslo".to_owned(),
            })
            .await
            .expect("send sign in");

        assert_eq!(
            next_event(&mut events).await,
            ClientEvent::StateChanged {
                state: ClientLifecycleState::Authenticating
            }
        );
        assert_eq!(
            next_event(&mut events).await,
            ClientEvent::StateChanged {
                state: ClientLifecycleState::SignedOut
            }
        );
        match next_event(&mut events).await {
            ClientEvent::AuthResult {
                success,
                error_code,
            } => {
                assert!(!success);
                assert_eq!(error_code.as_deref(), Some("invalid_credentials"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejects_marketplace_commands_before_sign_in() {
        let platform = seeded_platform();
        let (handle, mut events) = client(&platform);

        handle
            .send(ClientCommand::ListCategories)
            .await
            .expect("send list categories");

        match next_event(&mut events).await {
            ClientEvent::OperationFailed {
                code, recoverable, ..
            } => {
                assert_eq!(code, "invalid_state_transition");
                assert!(!recoverable);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn lists_categories_in_name_order() {
        let platform = seeded_platform();
        platform
            .seed_row(Row::Category(Category {
                id: "cat-elektro".to_owned(),
                name: "Elektroinstalace".to_owned(),
            }))
            .expect("seed category");
        let (handle, mut events) = client(&platform);
        sign_in(&handle, &mut events, CUSTOMER_EMAIL).await;

        handle
            .send(ClientCommand::ListCategories)
            .await
            .expect("send list categories");

        match next_event(&mut events).await {
            ClientEvent::CategoryList { categories } => {
                let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
                assert_eq!(names, vec!["Elektroinstalace", "Instalatérské práce"]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn posts_request_and_lists_it_under_mine() {
        let platform = seeded_platform();
        let (handle, mut events) = client(&platform);
        sign_in(&handle, &mut events, CUSTOMER_EMAIL).await;

        let request = post_request(&handle, &mut events, "Oprava kohoutku").await;
        assert!(!request.id.is_empty());
        assert_eq!(request.customer_id, CUSTOMER_ID);
        assert_eq!(request.status, RequestStatus::Open);
        assert!(request.created_at_ms > 0);

        handle
            .send(ClientCommand::ListMyRequests)
            .await
            .expect("send list my requests");

        match next_event(&mut events).await {
            ClientEvent::RequestList { scope, requests } => {
                assert_eq!(scope, RequestScope::Mine);
                assert_eq!(requests.len(), 1);
                assert_eq!(requests[0].id, request.id);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejects_post_request_for_fachman_accounts() {
        let platform = seeded_platform();
        let (handle, mut events) = client(&platform);
        sign_in(&handle, &mut events, FACHMAN_EMAIL).await;

        handle
            .send(ClientCommand::PostRequest {
                title: "Oprava kohoutku".to_owned(),
                description: "Kape voda".to_owned(),
                category_id: "cat-instalater".to_owned(),
            })
            .await
            .expect("send post request");

        match next_event(&mut events).await {
            ClientEvent::OperationFailed { code, .. } => {
                assert_eq!(code, "customer_role_required");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(platform.row_count(Table::Requests).expect("row count"), 0);
    }

    #[tokio::test]
    async fn rejects_blank_request_title_before_store() {
        let platform = seeded_platform();
        let (handle, mut events) = client(&platform);
        sign_in(&handle, &mut events, CUSTOMER_EMAIL).await;

        handle
            .send(ClientCommand::PostRequest {
                title: "   ".to_owned(),
                description: "Kape voda".to_owned(),
                category_id: "cat-instalater".to_owned(),
            })
            .await
            .expect("send post request");

        match next_event(&mut events).await {
            ClientEvent::OperationFailed { code, .. } => {
                assert_eq!(code, "empty_request_title");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(platform.row_count(Table::Requests).expect("row count"), 0);
    }

    #[tokio::test]
    async fn unverified_fachman_cannot_submit_offers() {
        let platform = seeded_platform();
        platform
            .seed_account(
                "novy@example.cz",
                PASSWORD,
                profile("fach-novy", "Nový Řemeslník", UserRole::Fachman, false),
            )
            .expect("seed unverified fachman");

        let (customer, mut customer_events) = client(&platform);
        sign_in(&customer, &mut customer_events, CUSTOMER_EMAIL).await;
        let request = post_request(&customer, &mut customer_events, "Oprava kohoutku").await;

        let (fachman, mut fachman_events) = client(&platform);
        sign_in(&fachman, &mut fachman_events, "novy@example.cz").await;
        fachman
            .send(ClientCommand::SubmitOffer {
                request_id: request.id.clone(),
                price_czk: 1500,
                message: String::new(),
            })
            .await
            .expect("send submit offer");

        match next_event(&mut fachman_events).await {
            ClientEvent::OperationFailed { code, .. } => {
                assert_eq!(code, "fachman_not_verified");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(platform.row_count(Table::Offers).expect("row count"), 0);
    }

    #[tokio::test]
    async fn offer_submission_notifies_the_customer() {
        let platform = seeded_platform();
        let (customer, mut customer_events) = client(&platform);
        sign_in(&customer, &mut customer_events, CUSTOMER_EMAIL).await;
        let request = post_request(&customer, &mut customer_events, "Oprava kohoutku").await;

        let (fachman, mut fachman_events) = client(&platform);
        sign_in(&fachman, &mut fachman_events, FACHMAN_EMAIL).await;
        let offer = submit_offer(&fachman, &mut fachman_events, &request.id, 1500).await;
        assert_eq!(offer.fachman_id, FACHMAN_ID);
        assert_eq!(offer.status, OfferStatus::Pending);
        assert!(offer.created_at_ms > 0);

        customer
            .send(ClientCommand::ListNotifications)
            .await
            .expect("send list notifications");
        match next_event(&mut customer_events).await {
            ClientEvent::NotificationList { notifications } => {
                assert_eq!(notifications.len(), 1);
                assert_eq!(notifications[0].kind, NotificationKind::NewOffer);
                assert!(notifications[0].body.contains("Oprava kohoutku"));
                assert!(!notifications[0].is_read);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        customer
            .send(ClientCommand::MarkNotificationsRead)
            .await
            .expect("send mark notifications read");
        match next_event(&mut customer_events).await {
            ClientEvent::NotificationsRead { marked } => assert_eq!(marked, 1),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejects_second_offer_on_same_request() {
        let platform = seeded_platform();
        let (customer, mut customer_events) = client(&platform);
        sign_in(&customer, &mut customer_events, CUSTOMER_EMAIL).await;
        let request = post_request(&customer, &mut customer_events, "Oprava kohoutku").await;

        let (fachman, mut fachman_events) = client(&platform);
        sign_in(&fachman, &mut fachman_events, FACHMAN_EMAIL).await;
        submit_offer(&fachman, &mut fachman_events, &request.id, 1500).await;

        fachman
            .send(ClientCommand::SubmitOffer {
                request_id: request.id.clone(),
                price_czk: 1200,
                message: "Sleva".to_owned(),
            })
            .await
            .expect("send second offer");

        match next_event(&mut fachman_events).await {
            ClientEvent::OperationFailed { code, .. } => assert_eq!(code, "offer_exists"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(platform.row_count(Table::Offers).expect("row count"), 1);
    }

    #[tokio::test]
    async fn accepting_offer_declines_siblings_and_starts_work() {
        let platform = seeded_platform();
        platform
            .seed_account(
                "karel@example.cz",
                PASSWORD,
                profile("fach-karel", "Karel Dvořák", UserRole::Fachman, true),
            )
            .expect("seed second fachman");

        let (customer, mut customer_events) = client(&platform);
        sign_in(&customer, &mut customer_events, CUSTOMER_EMAIL).await;
        let request = post_request(&customer, &mut customer_events, "Rekonstrukce koupelny").await;

        let (petr, mut petr_events) = client(&platform);
        sign_in(&petr, &mut petr_events, FACHMAN_EMAIL).await;
        let petr_offer = submit_offer(&petr, &mut petr_events, &request.id, 40_000).await;

        let (karel, mut karel_events) = client(&platform);
        sign_in(&karel, &mut karel_events, "karel@example.cz").await;
        let karel_offer = submit_offer(&karel, &mut karel_events, &request.id, 35_000).await;

        accept_offer(&customer, &mut customer_events, &petr_offer.id).await;

        customer
            .send(ClientCommand::ListOffers {
                request_id: request.id.clone(),
            })
            .await
            .expect("send list offers");
        match next_event(&mut customer_events).await {
            ClientEvent::OfferList { offers, .. } => {
                assert_eq!(offers.len(), 2);
                for offer in &offers {
                    let expected = if offer.id == petr_offer.id {
                        OfferStatus::Accepted
                    } else {
                        OfferStatus::Declined
                    };
                    assert_eq!(offer.status, expected);
                }
            }
            other => panic!("unexpected event: {other:?}"),
        }

        customer
            .send(ClientCommand::ListMyRequests)
            .await
            .expect("send list my requests");
        match next_event(&mut customer_events).await {
            ClientEvent::RequestList { requests, .. } => {
                assert_eq!(requests[0].status, RequestStatus::InProgress);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        petr.send(ClientCommand::ListNotifications)
            .await
            .expect("send list notifications");
        match next_event(&mut petr_events).await {
            ClientEvent::NotificationList { notifications } => {
                assert!(
                    notifications
                        .iter()
                        .any(|n| n.kind == NotificationKind::OfferAccepted)
                );
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // the declined sibling cannot be accepted afterwards
        customer
            .send(ClientCommand::AcceptOffer {
                offer_id: karel_offer.id.clone(),
            })
            .await
            .expect("send accept declined offer");
        match next_event(&mut customer_events).await {
            ClientEvent::OperationFailed { code, .. } => assert_eq!(code, "offer_not_pending"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn only_the_request_owner_lists_offers() {
        let platform = seeded_platform();
        let (customer, mut customer_events) = client(&platform);
        sign_in(&customer, &mut customer_events, CUSTOMER_EMAIL).await;
        let request = post_request(&customer, &mut customer_events, "Oprava kohoutku").await;

        let (fachman, mut fachman_events) = client(&platform);
        sign_in(&fachman, &mut fachman_events, FACHMAN_EMAIL).await;
        fachman
            .send(ClientCommand::ListOffers {
                request_id: request.id.clone(),
            })
            .await
            .expect("send list offers");

        match next_event(&mut fachman_events).await {
            ClientEvent::OperationFailed { code, .. } => assert_eq!(code, "not_request_owner"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn review_completes_request_and_feeds_rating() {
        let platform = seeded_platform();
        let (customer, mut customer_events) = client(&platform);
        sign_in(&customer, &mut customer_events, CUSTOMER_EMAIL).await;
        let request = post_request(&customer, &mut customer_events, "Oprava kohoutku").await;

        let (fachman, mut fachman_events) = client(&platform);
        sign_in(&fachman, &mut fachman_events, FACHMAN_EMAIL).await;
        let offer = submit_offer(&fachman, &mut fachman_events, &request.id, 1500).await;
        accept_offer(&customer, &mut customer_events, &offer.id).await;

        customer
            .send(ClientCommand::SubmitReview {
                request_id: request.id.clone(),
                rating: 5,
                comment: "Rychlá a kvalitní práce".to_owned(),
            })
            .await
            .expect("send submit review");
        match next_event(&mut customer_events).await {
            ClientEvent::ReviewSubmitted { review } => {
                assert_eq!(review.fachman_id, FACHMAN_ID);
                assert_eq!(review.reviewer_id, CUSTOMER_ID);
                assert_eq!(review.rating, 5);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        customer
            .send(ClientCommand::ListReviews {
                fachman_id: FACHMAN_ID.to_owned(),
            })
            .await
            .expect("send list reviews");
        match next_event(&mut customer_events).await {
            ClientEvent::ReviewList {
                fachman_id,
                reviews,
                average_rating,
            } => {
                assert_eq!(fachman_id, FACHMAN_ID);
                assert_eq!(reviews.len(), 1);
                assert_eq!(average_rating, Some(5.0));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        customer
            .send(ClientCommand::ListMyRequests)
            .await
            .expect("send list my requests");
        match next_event(&mut customer_events).await {
            ClientEvent::RequestList { requests, .. } => {
                assert_eq!(requests[0].status, RequestStatus::Completed);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        customer
            .send(ClientCommand::SubmitReview {
                request_id: request.id.clone(),
                rating: 4,
                comment: String::new(),
            })
            .await
            .expect("send second review");
        match next_event(&mut customer_events).await {
            ClientEvent::OperationFailed { code, .. } => {
                assert_eq!(code, "review_exists");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn chat_messages_flow_live_between_two_clients() {
        let platform = seeded_platform();
        let (customer, mut customer_events) = client(&platform);
        sign_in(&customer, &mut customer_events, CUSTOMER_EMAIL).await;
        let request = post_request(&customer, &mut customer_events, "Oprava kohoutku").await;

        let (fachman, mut fachman_events) = client(&platform);
        sign_in(&fachman, &mut fachman_events, FACHMAN_EMAIL).await;

        let customer_history =
            open_chat(&customer, &mut customer_events, &request.id, FACHMAN_ID).await;
        assert!(customer_history.is_empty());
        let fachman_history =
            open_chat(&fachman, &mut fachman_events, &request.id, CUSTOMER_ID).await;
        assert!(fachman_history.is_empty());

        customer
            .send(ClientCommand::SendChatMessage {
                client_txn_id: "txn-1".to_owned(),
                body: "Dobrý den, kdy můžete přijít?".to_owned(),
            })
            .await
            .expect("send chat message");

        // the sender sees the echo first, then the acknowledgement
        let echoed = match next_event(&mut customer_events).await {
            ClientEvent::ChatAppended { message } => message,
            other => panic!("unexpected event: {other:?}"),
        };
        assert_eq!(echoed.sender_id, CUSTOMER_ID);
        assert_eq!(echoed.receiver_id, FACHMAN_ID);
        assert!(!echoed.id.is_empty());
        match next_event(&mut customer_events).await {
            ClientEvent::SendAck(ack) => {
                assert_eq!(ack.client_txn_id, "txn-1");
                assert_eq!(ack.message_id.as_deref(), Some(echoed.id.as_str()));
                assert_eq!(ack.error_code, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // the receiver gets the same message through the live feed
        match next_event(&mut fachman_events).await {
            ClientEvent::ChatAppended { message } => {
                assert_eq!(message.id, echoed.id);
                assert_eq!(message.body, "Dobrý den, kdy můžete přijít?");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // and the reply flows the other way
        send_message(&fachman, &mut fachman_events, "txn-2", "Zítra v osm").await;
        match next_event(&mut customer_events).await {
            ClientEvent::ChatAppended { message } => {
                assert_eq!(message.sender_id, FACHMAN_ID);
                assert_eq!(message.body, "Zítra v osm");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_chat_message_requires_an_open_chat() {
        let platform = seeded_platform();
        let (handle, mut events) = client(&platform);
        sign_in(&handle, &mut events, CUSTOMER_EMAIL).await;

        handle
            .send(ClientCommand::SendChatMessage {
                client_txn_id: "txn-1".to_owned(),
                body: "Dobrý den".to_owned(),
            })
            .await
            .expect("send chat message");

        match next_event(&mut events).await {
            ClientEvent::SendAck(ack) => {
                assert_eq!(ack.client_txn_id, "txn-1");
                assert_eq!(ack.message_id, None);
                assert_eq!(ack.error_code.as_deref(), Some("chat_not_open"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn opening_chat_marks_unread_history_read() {
        let platform = seeded_platform();
        let (customer, mut customer_events) = client(&platform);
        sign_in(&customer, &mut customer_events, CUSTOMER_EMAIL).await;
        let request = post_request(&customer, &mut customer_events, "Oprava kohoutku").await;

        let (fachman, mut fachman_events) = client(&platform);
        sign_in(&fachman, &mut fachman_events, FACHMAN_EMAIL).await;
        open_chat(&fachman, &mut fachman_events, &request.id, CUSTOMER_ID).await;
        send_message(&fachman, &mut fachman_events, "txn-1", "Dobrý den").await;
        send_message(&fachman, &mut fachman_events, "txn-2", "Mám volný termín").await;

        customer
            .send(ClientCommand::ListConversations)
            .await
            .expect("send list conversations");
        match next_event(&mut customer_events).await {
            ClientEvent::ConversationList { conversations } => {
                assert_eq!(conversations.len(), 1);
                let thread = &conversations[0];
                assert_eq!(thread.counterpart_id, FACHMAN_ID);
                assert_eq!(thread.counterpart_name, "Petr Svoboda");
                assert_eq!(thread.request_title, "Oprava kohoutku");
                assert_eq!(thread.last_message, "Mám volný termín");
                assert_eq!(thread.unread_count, 2);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let history = open_chat(&customer, &mut customer_events, &request.id, FACHMAN_ID).await;
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|m| m.is_read));

        customer
            .send(ClientCommand::MarkChatRead)
            .await
            .expect("send mark chat read");
        match next_event(&mut customer_events).await {
            ClientEvent::ChatRead { marked } => assert_eq!(marked, 0),
            other => panic!("unexpected event: {other:?}"),
        }

        customer
            .send(ClientCommand::ListConversations)
            .await
            .expect("send list conversations");
        match next_event(&mut customer_events).await {
            ClientEvent::ConversationList { conversations } => {
                assert_eq!(conversations[0].unread_count, 0);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn closing_chat_stops_live_delivery() {
        let platform = seeded_platform();
        let (customer, mut customer_events) = client(&platform);
        sign_in(&customer, &mut customer_events, CUSTOMER_EMAIL).await;
        let request = post_request(&customer, &mut customer_events, "Oprava kohoutku").await;

        let (fachman, mut fachman_events) = client(&platform);
        sign_in(&fachman, &mut fachman_events, FACHMAN_EMAIL).await;
        open_chat(&fachman, &mut fachman_events, &request.id, CUSTOMER_ID).await;

        open_chat(&customer, &mut customer_events, &request.id, FACHMAN_ID).await;
        customer
            .send(ClientCommand::CloseChat)
            .await
            .expect("send close chat");
        assert_eq!(next_event(&mut customer_events).await, ClientEvent::ChatClosed);

        send_message(&fachman, &mut fachman_events, "txn-1", "Ještě jsem tu").await;

        // nothing may land on the closed side; the next event on the
        // customer stream belongs to the next command
        customer
            .send(ClientCommand::ListCategories)
            .await
            .expect("send list categories");
        match next_event(&mut customer_events).await {
            ClientEvent::CategoryList { .. } => {}
            other => panic!("unexpected event: {other:?}"),
        }

        customer
            .send(ClientCommand::CloseChat)
            .await
            .expect("send close chat again");
        match next_event(&mut customer_events).await {
            ClientEvent::OperationFailed { code, .. } => assert_eq!(code, "chat_not_open"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn password_reset_flow_recovers_account() {
        let platform = seeded_platform();
        let (handle, mut events) = client(&platform);

        handle
            .send(ClientCommand::ResetPassword {
                email: CUSTOMER_EMAIL.to_owned(),
            })
            .await
            .expect("send reset password");
        match next_event(&mut events).await {
            ClientEvent::ResetEmailSent { email } => assert_eq!(email, CUSTOMER_EMAIL),
            other => panic!("unexpected event: {other:?}"),
        }

        let token = platform
            .last_reset_token(CUSTOMER_EMAIL)
            .expect("token lookup")
            .expect("reset should record a token");

        handle
            .send(ClientCommand::RecoverSession {
                recovery_token: token,
            })
            .await
            .expect("send recover session");
        assert_eq!(
            next_event(&mut events).await,
            ClientEvent::StateChanged {
                state: ClientLifecycleState::Recovering
            }
        );
        assert_eq!(
            next_event(&mut events).await,
            ClientEvent::StateChanged {
                state: ClientLifecycleState::PasswordRecovery
            }
        );
        match next_event(&mut events).await {
            ClientEvent::AuthResult { success, .. } => assert!(success),
            other => panic!("unexpected event: {other:?}"),
        }
        match next_event(&mut events).await {
            ClientEvent::ProfileLoaded { profile } => assert_eq!(profile.id, CUSTOMER_ID),
            other => panic!("unexpected event: {other:?}"),
        }

        handle
            .send(ClientCommand::UpdatePassword {
                new_password: "novetajne".to_owned(),
                confirm: "novetajne".to_owned(),
            })
            .await
            .expect("send update password");
        assert_eq!(next_event(&mut events).await, ClientEvent::PasswordUpdated);
        assert_eq!(
            next_event(&mut events).await,
            ClientEvent::StateChanged {
                state: ClientLifecycleState::Authenticated
            }
        );

        // the promoted session can use marketplace commands right away
        handle
            .send(ClientCommand::ListCategories)
            .await
            .expect("send list categories");
        match next_event(&mut events).await {
            ClientEvent::CategoryList { categories } => assert_eq!(categories.len(), 1),
            other => panic!("unexpected event: {other:?}"),
        }

        handle
            .send(ClientCommand::SignOut)
            .await
            .expect("send sign out");
        assert_eq!(
            next_event(&mut events).await,
            ClientEvent::StateChanged {
                state: ClientLifecycleState::SignedOut
            }
        );

        // the old password no longer works, the new one does
        handle
            .send(ClientCommand::SignIn {
                email: CUSTOMER_EMAIL.to_owned(),
                password: PASSWORD.to_owned(),
            })
            .await
            .expect("send sign in");
        loop {
            match next_event(&mut events).await {
                ClientEvent::AuthResult {
                    success,
                    error_code,
                } => {
                    assert!(!success);
                    assert_eq!(error_code.as_deref(), Some("invalid_credentials"));
                    break;
                }
                _ => {}
            }
        }

        handle
            .send(ClientCommand::SignIn {
                email: CUSTOMER_EMAIL.to_owned(),
                password: "novetajne".to_owned(),
            })
            .await
            .expect("send sign in");
        loop {
            match next_event(&mut events).await {
                ClientEvent::AuthResult { success, .. } => assert!(success),
                ClientEvent::ProfileLoaded { .. } => break,
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_recoverable_operation_failed() {
        let platform = seeded_platform();
        let (handle, mut events) = client(&platform);
        sign_in(&handle, &mut events, CUSTOMER_EMAIL).await;

        platform
            .fail_next_store_op(PlatformError::Unavailable("connection refused".to_owned()))
            .expect("arm store failure");

        handle
            .send(ClientCommand::ListCategories)
            .await
            .expect("send list categories");
        match next_event(&mut events).await {
            ClientEvent::OperationFailed {
                code,
                message,
                recoverable,
            } => {
                assert_eq!(code, "store_unavailable");
                assert!(message.contains("connection refused"));
                assert!(recoverable);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // the failure was one-shot; the retry goes through
        handle
            .send(ClientCommand::ListCategories)
            .await
            .expect("send list categories");
        match next_event(&mut events).await {
            ClientEvent::CategoryList { .. } => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn sign_out_closes_open_chat() {
        let platform = seeded_platform();
        let (customer, mut customer_events) = client(&platform);
        sign_in(&customer, &mut customer_events, CUSTOMER_EMAIL).await;
        let request = post_request(&customer, &mut customer_events, "Oprava kohoutku").await;
        open_chat(&customer, &mut customer_events, &request.id, FACHMAN_ID).await;

        customer
            .send(ClientCommand::SignOut)
            .await
            .expect("send sign out");
        assert_eq!(next_event(&mut customer_events).await, ClientEvent::ChatClosed);
        assert_eq!(
            next_event(&mut customer_events).await,
            ClientEvent::StateChanged {
                state: ClientLifecycleState::SignedOut
            }
        );

        customer
            .send(ClientCommand::ListMyRequests)
            .await
            .expect("send list my requests");
        match next_event(&mut customer_events).await {
            ClientEvent::OperationFailed { code, .. } => {
                assert_eq!(code, "invalid_state_transition");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
