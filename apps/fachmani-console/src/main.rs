mod config;
mod logging;

use std::{error::Error, fmt, process, sync::Arc, time::Duration};

use backend_core::{
    Category, ClientChannelError, ClientCommand, ClientEvent, ClientLifecycleState, EventStream,
    Profile, UserRole,
};
use backend_platform::{MemoryPlatform, PlatformError, Row};
use backend_runtime::{ClientRuntimeHandle, spawn_runtime};
use config::ConsoleConfig;
use tracing::info;

const CUSTOMER_ID: &str = "user-jana";
const FACHMAN_ID: &str = "user-petr";
const PLUMBING_CATEGORY_ID: &str = "cat-instalaterstvi";

#[tokio::main]
async fn main() {
    logging::init();
    info!("starting fachmani-console");

    let config = match ConsoleConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            process::exit(2);
        }
    };

    if let Err(err) = run_walkthrough(&config).await {
        eprintln!("Walkthrough failed: {err}");
        process::exit(1);
    }
}

/// Drives one request from posting to review with two concurrent clients
/// sharing an in-memory platform.
async fn run_walkthrough(config: &ConsoleConfig) -> Result<(), WalkthroughError> {
    let platform = seed_platform(config)?;

    println!("Fachmani walkthrough: two clients on one in-memory platform");
    println!();

    let mut customer = Actor::connect("jana", &platform, config.event_timeout());
    let mut fachman = Actor::connect("petr", &platform, config.event_timeout());

    customer
        .sign_in(&config.customer_email, &config.demo_password)
        .await?;
    let petr = fachman
        .sign_in(&config.fachman_email, &config.demo_password)
        .await?;

    // The customer browses categories and posts a request.
    customer.send(ClientCommand::ListCategories).await?;
    let categories = customer
        .expect("category list", |event| match event {
            ClientEvent::CategoryList { categories } => Some(categories),
            _ => None,
        })
        .await?;
    let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
    println!("[jana] categories on offer: {}", names.join(", "));

    customer
        .send(ClientCommand::PostRequest {
            title: "Oprava kapajícího kohoutku".to_owned(),
            description: "V kuchyni kape kohoutek, potřebuji vyměnit těsnění.".to_owned(),
            category_id: PLUMBING_CATEGORY_ID.to_owned(),
        })
        .await?;
    let request = customer
        .expect("posted request", |event| match event {
            ClientEvent::RequestPosted { request } => Some(request),
            _ => None,
        })
        .await?;
    println!("[jana] posted '{}'", request.title);

    // The fachman finds the request in his trade and makes an offer.
    fachman
        .send(ClientCommand::ListOpenRequests {
            category_id: Some(PLUMBING_CATEGORY_ID.to_owned()),
        })
        .await?;
    let open = fachman
        .expect("open requests", |event| match event {
            ClientEvent::RequestList { requests, .. } => Some(requests),
            _ => None,
        })
        .await?;
    println!("[petr] sees {} open request(s) in his trade", open.len());

    fachman
        .send(ClientCommand::SubmitOffer {
            request_id: request.id.clone(),
            price_czk: 1_200,
            message: "Dobrý den, těsnění vyměním do hodiny, cena včetně materiálu.".to_owned(),
        })
        .await?;
    let offer = fachman
        .expect("submitted offer", |event| match event {
            ClientEvent::OfferSubmitted { offer } => Some(offer),
            _ => None,
        })
        .await?;
    println!("[petr] offered {} Kč", offer.price_czk);

    // The offer shows up in the customer's notifications.
    customer.send(ClientCommand::ListNotifications).await?;
    let notifications = customer
        .expect("notification list", |event| match event {
            ClientEvent::NotificationList { notifications } => Some(notifications),
            _ => None,
        })
        .await?;
    for notification in &notifications {
        println!("[jana] notification: {}", notification.body);
    }

    customer
        .send(ClientCommand::AcceptOffer {
            offer_id: offer.id.clone(),
        })
        .await?;
    let accepted = customer
        .expect("accepted offer", |event| match event {
            ClientEvent::OfferAccepted { offer } => Some(offer),
            _ => None,
        })
        .await?;
    println!(
        "[jana] accepted the {} Kč offer, work can start",
        accepted.price_czk
    );

    // Both sides open the request chat and exchange a couple of messages.
    customer
        .send(ClientCommand::OpenChat {
            request_id: request.id.clone(),
            counterpart_id: petr.id.clone(),
        })
        .await?;
    customer
        .expect("opened chat", |event| match event {
            ClientEvent::ChatOpened { .. } => Some(()),
            _ => None,
        })
        .await?;
    fachman
        .send(ClientCommand::OpenChat {
            request_id: request.id.clone(),
            counterpart_id: request.customer_id.clone(),
        })
        .await?;
    fachman
        .expect("opened chat", |event| match event {
            ClientEvent::ChatOpened { .. } => Some(()),
            _ => None,
        })
        .await?;

    customer
        .send(ClientCommand::SendChatMessage {
            client_txn_id: "txn-1".to_owned(),
            body: "Dobrý den, kdy byste mohl přijít?".to_owned(),
        })
        .await?;
    let incoming = fachman
        .expect("incoming chat message", |event| match event {
            ClientEvent::ChatAppended { message } => Some(message),
            _ => None,
        })
        .await?;
    println!("[petr] chat from jana: {}", incoming.body);

    fachman
        .send(ClientCommand::SendChatMessage {
            client_txn_id: "txn-2".to_owned(),
            body: "Zítra ráno v osm, pokud se to hodí.".to_owned(),
        })
        .await?;
    let reply = customer
        .expect("chat reply", |event| match event {
            ClientEvent::ChatAppended { message } if message.sender_id == FACHMAN_ID => {
                Some(message)
            }
            _ => None,
        })
        .await?;
    println!("[jana] chat from petr: {}", reply.body);

    // The conversation digest reflects the open, fully read thread.
    customer.send(ClientCommand::ListConversations).await?;
    let conversations = customer
        .expect("conversation digest", |event| match event {
            ClientEvent::ConversationList { conversations } => Some(conversations),
            _ => None,
        })
        .await?;
    for thread in &conversations {
        println!(
            "[jana] thread '{}' with {}: \"{}\" ({} unread)",
            thread.request_title, thread.counterpart_name, thread.last_message, thread.unread_count
        );
    }

    customer.send(ClientCommand::CloseChat).await?;
    customer
        .expect("closed chat", |event| match event {
            ClientEvent::ChatClosed => Some(()),
            _ => None,
        })
        .await?;

    // Work done; the customer reviews the fachman.
    customer
        .send(ClientCommand::SubmitReview {
            request_id: request.id.clone(),
            rating: 5,
            comment: "Rychlá domluva, skvělá práce.".to_owned(),
        })
        .await?;
    let review = customer
        .expect("submitted review", |event| match event {
            ClientEvent::ReviewSubmitted { review } => Some(review),
            _ => None,
        })
        .await?;
    println!("[jana] left a {}-star review", review.rating);

    customer
        .send(ClientCommand::ListReviews {
            fachman_id: petr.id.clone(),
        })
        .await?;
    let (reviews, average) = customer
        .expect("review list", |event| match event {
            ClientEvent::ReviewList {
                reviews,
                average_rating,
                ..
            } => Some((reviews, average_rating)),
            _ => None,
        })
        .await?;
    println!(
        "[jana] {} now has {} review(s), average {:.1}",
        petr.full_name,
        reviews.len(),
        average.unwrap_or(0.0)
    );

    // The fachman catches up on his notifications before signing off.
    fachman.send(ClientCommand::ListNotifications).await?;
    let fachman_notifications = fachman
        .expect("notification list", |event| match event {
            ClientEvent::NotificationList { notifications } => Some(notifications),
            _ => None,
        })
        .await?;
    for notification in &fachman_notifications {
        println!("[petr] notification: {}", notification.body);
    }
    fachman.send(ClientCommand::MarkNotificationsRead).await?;
    let marked = fachman
        .expect("notifications marked read", |event| match event {
            ClientEvent::NotificationsRead { marked } => Some(marked),
            _ => None,
        })
        .await?;
    println!("[petr] marked {marked} notification(s) read");

    customer.sign_out().await?;
    fachman.sign_out().await?;

    println!();
    println!("Walkthrough complete.");
    Ok(())
}

fn seed_platform(config: &ConsoleConfig) -> Result<Arc<MemoryPlatform>, WalkthroughError> {
    let platform = Arc::new(MemoryPlatform::new());
    platform.seed_account(
        &config.customer_email,
        &config.demo_password,
        Profile {
            id: CUSTOMER_ID.to_owned(),
            full_name: "Jana Nováková".to_owned(),
            role: UserRole::Customer,
            verified: false,
            created_at_ms: 1,
        },
    )?;
    platform.seed_account(
        &config.fachman_email,
        &config.demo_password,
        Profile {
            id: FACHMAN_ID.to_owned(),
            full_name: "Petr Svoboda".to_owned(),
            role: UserRole::Fachman,
            verified: true,
            created_at_ms: 1,
        },
    )?;
    platform.seed_row(Row::Category(Category {
        id: PLUMBING_CATEGORY_ID.to_owned(),
        name: "Instalatérské práce".to_owned(),
    }))?;
    platform.seed_row(Row::Category(Category {
        id: "cat-elektro".to_owned(),
        name: "Elektroinstalace".to_owned(),
    }))?;
    Ok(platform)
}

/// One signed-in participant: a spawned runtime plus its event stream.
struct Actor {
    label: &'static str,
    handle: ClientRuntimeHandle,
    events: EventStream,
    event_timeout: Duration,
}

impl Actor {
    fn connect(
        label: &'static str,
        platform: &Arc<MemoryPlatform>,
        event_timeout: Duration,
    ) -> Self {
        let handle = spawn_runtime(platform.clone(), platform.clone());
        let events = handle.subscribe();
        Self {
            label,
            handle,
            events,
            event_timeout,
        }
    }

    async fn send(&self, command: ClientCommand) -> Result<(), WalkthroughError> {
        Ok(self.handle.send(command).await?)
    }

    async fn next(&mut self, waiting_for: &'static str) -> Result<ClientEvent, WalkthroughError> {
        match tokio::time::timeout(self.event_timeout, self.events.recv()).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(WalkthroughError::StreamClosed { waiting_for }),
            Err(_) => Err(WalkthroughError::Timeout { waiting_for }),
        }
    }

    /// Wait until `pick` matches an event, failing fast on `OperationFailed`.
    async fn expect<T, F>(
        &mut self,
        waiting_for: &'static str,
        mut pick: F,
    ) -> Result<T, WalkthroughError>
    where
        F: FnMut(ClientEvent) -> Option<T>,
    {
        loop {
            let event = self.next(waiting_for).await?;
            if let ClientEvent::OperationFailed { code, message, .. } = &event {
                return Err(WalkthroughError::Operation {
                    actor: self.label,
                    code: code.clone(),
                    message: message.clone(),
                });
            }
            if let Some(value) = pick(event) {
                return Ok(value);
            }
        }
    }

    async fn sign_in(
        &mut self,
        email: &str,
        password: &str,
    ) -> Result<Profile, WalkthroughError> {
        self.send(ClientCommand::SignIn {
            email: email.to_owned(),
            password: password.to_owned(),
        })
        .await?;

        loop {
            match self.next("sign-in result").await? {
                ClientEvent::AuthResult {
                    success: false,
                    error_code,
                } => {
                    return Err(WalkthroughError::SignIn {
                        actor: self.label,
                        code: error_code.unwrap_or_else(|| "unknown".to_owned()),
                    });
                }
                ClientEvent::ProfileLoaded { profile } => {
                    println!("[{}] signed in as {}", self.label, profile.full_name);
                    return Ok(profile);
                }
                _ => {}
            }
        }
    }

    async fn sign_out(&mut self) -> Result<(), WalkthroughError> {
        self.send(ClientCommand::SignOut).await?;
        self.expect("signed out", |event| match event {
            ClientEvent::StateChanged {
                state: ClientLifecycleState::SignedOut,
            } => Some(()),
            _ => None,
        })
        .await?;
        println!("[{}] signed out", self.label);
        Ok(())
    }
}

#[derive(Debug)]
enum WalkthroughError {
    Platform(PlatformError),
    Channel(ClientChannelError),
    Timeout { waiting_for: &'static str },
    StreamClosed { waiting_for: &'static str },
    SignIn { actor: &'static str, code: String },
    Operation {
        actor: &'static str,
        code: String,
        message: String,
    },
}

impl fmt::Display for WalkthroughError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Platform(err) => write!(f, "platform setup failed: {err}"),
            Self::Channel(err) => write!(f, "runtime unreachable: {err}"),
            Self::Timeout { waiting_for } => write!(f, "timed out waiting for {waiting_for}"),
            Self::StreamClosed { waiting_for } => {
                write!(f, "event stream closed while waiting for {waiting_for}")
            }
            Self::SignIn { actor, code } => write!(f, "{actor} could not sign in: {code}"),
            Self::Operation {
                actor,
                code,
                message,
            } => write!(f, "{actor} hit '{code}': {message}"),
        }
    }
}

impl Error for WalkthroughError {}

impl From<PlatformError> for WalkthroughError {
    fn from(err: PlatformError) -> Self {
        Self::Platform(err)
    }
}

impl From<ClientChannelError> for WalkthroughError {
    fn from(err: ClientChannelError) -> Self {
        Self::Channel(err)
    }
}
