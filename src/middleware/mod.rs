//! Traffic filtering middleware
//!
//! An allow/deny ruleset keyed by user-agent pattern, loaded once at process
//! startup into an immutable value and handed to the middleware explicitly.

use std::sync::Arc;

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{error::ErrorForbidden, Error};
use futures::future::{ready, LocalBoxFuture, Ready};
use regex::Regex;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrafficAction {
    Deny,
    Allow,
    NoAction,
}

#[derive(Debug)]
pub struct TrafficRule {
    pub name: String,
    pub user_agent_regex: Regex,
    pub action: TrafficAction,
}

/// Immutable ruleset, evaluated top to bottom per request
#[derive(Debug, Default)]
pub struct TrafficRules {
    rules: Vec<TrafficRule>,
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    rules: Vec<RawRule>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    name: String,
    user_agent_regex: String,
    action: TrafficAction,
}

impl TrafficRules {
    /// Load the ruleset from a JSON file. Called once, at startup.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let raw: RuleFile = serde_json::from_str(&std::fs::read_to_string(path)?)?;

        let rules = raw
            .rules
            .into_iter()
            .map(|r| {
                Ok(TrafficRule {
                    user_agent_regex: Regex::new(&r.user_agent_regex)?,
                    name: r.name,
                    action: r.action,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// A request with no user agent is denied as soon as any rule exists.
    /// Otherwise the first matching DENY rejects, the first matching ALLOW
    /// stops evaluation, and non-matches fall through.
    pub fn permits(&self, user_agent: Option<&str>) -> bool {
        for rule in &self.rules {
            let Some(user_agent) = user_agent else {
                return false;
            };

            if rule.user_agent_regex.is_match(user_agent) {
                match rule.action {
                    TrafficAction::Deny => return false,
                    TrafficAction::Allow => return true,
                    TrafficAction::NoAction => continue,
                }
            }
        }

        true
    }
}

pub struct TrafficFilter {
    rules: Arc<TrafficRules>,
}

impl TrafficFilter {
    pub fn new(rules: Arc<TrafficRules>) -> Self {
        Self { rules }
    }
}

impl<S, B> Transform<S, ServiceRequest> for TrafficFilter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = TrafficFilterService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TrafficFilterService {
            service,
            rules: self.rules.clone(),
        }))
    }
}

pub struct TrafficFilterService<S> {
    service: S,
    rules: Arc<TrafficRules>,
}

impl<S, B> Service<ServiceRequest> for TrafficFilterService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let user_agent = req
            .headers()
            .get(actix_web::http::header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(str::to_owned);

        if !self.rules.permits(user_agent.as_deref()) {
            return Box::pin(ready(Err(ErrorForbidden("blocked"))));
        }

        let fut = self.service.call(req);
        Box::pin(fut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(spec: &[(&str, TrafficAction)]) -> TrafficRules {
        TrafficRules {
            rules: spec
                .iter()
                .map(|(pattern, action)| TrafficRule {
                    name: pattern.to_string(),
                    user_agent_regex: Regex::new(pattern).unwrap(),
                    action: *action,
                })
                .collect(),
        }
    }

    #[test]
    fn empty_ruleset_permits_everything() {
        let rules = TrafficRules::default();
        assert!(rules.permits(Some("curl/8")));
        assert!(rules.permits(None));
    }

    #[test]
    fn missing_user_agent_is_denied_once_rules_exist() {
        let rules = rules(&[("bot", TrafficAction::Deny)]);
        assert!(!rules.permits(None));
    }

    #[test]
    fn first_deny_match_wins() {
        let rules = rules(&[
            ("GoodBot", TrafficAction::Allow),
            ("Bot", TrafficAction::Deny),
        ]);
        assert!(rules.permits(Some("GoodBot/1.0")));
        assert!(!rules.permits(Some("EvilBot/1.0")));
    }

    #[test]
    fn non_matching_rules_fall_through_to_allow() {
        let rules = rules(&[("scraper", TrafficAction::Deny)]);
        assert!(rules.permits(Some("Mozilla/5.0")));
    }

    #[test]
    fn no_action_match_keeps_evaluating() {
        let rules = rules(&[
            ("Mozilla", TrafficAction::NoAction),
            ("Mozilla.*Evil", TrafficAction::Deny),
        ]);
        assert!(!rules.permits(Some("Mozilla/5.0 Evil")));
        assert!(rules.permits(Some("Mozilla/5.0")));
    }
}
