/// Authentication and authorization
///
/// # Modules
///
/// - [`session`]: HS256 session tokens and their claims
/// - [`middleware`]: Cookie handling and per-request session resolution
/// - [`oauth`]: OAuth provider seam and the Google implementation
/// - [`authorization`]: Ownership, role and workspace checks
/// - [`confirmation`]: Signed, expiring account deletion tokens
/// - [`events`]: Authentication event log
///
/// Sign-in attempt limiting lives in [`crate::rate_limit`].
///
/// # Example
///
/// ```no_run
/// use calendar_agent_shared::auth::middleware::resolve_session;
/// use calendar_agent_shared::repository::MemoryRepository;
/// use chrono::Duration;
///
/// # async fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
/// let repo = MemoryRepository::new();
/// let resolved = resolve_session(&repo, token, "secret-of-at-least-32-characters", Duration::days(30)).await?;
/// println!("signed in as {}", resolved.context.email);
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod confirmation;
pub mod events;
pub mod middleware;
pub mod oauth;
pub mod session;
