//! Query id and token generation
//!
//! Values come from `RandomEffects` and are retried while they collide with
//! a value that is already live in the relevant scope: the pending table for
//! query ids, the query's own token set for tokens.

use bbq_core::effects::RandomEffects;
use bbq_core::{BbqError, BbqResult, ParticipantId, QueryId, Token};
use std::collections::HashMap;
use std::sync::Arc;

/// Upper bound on retries; unreachable with a working CSPRNG
const MAX_ATTEMPTS: usize = 64;

/// Produces unpredictable query ids and capability tokens
#[derive(Clone)]
pub struct IdentityGenerator {
    random: Arc<dyn RandomEffects>,
}

impl IdentityGenerator {
    /// Generator drawing from `random`
    pub fn new(random: Arc<dyn RandomEffects>) -> Self {
        Self { random }
    }

    /// Next raw value
    pub fn next(&self) -> u64 {
        self.random.random_u64()
    }

    /// Query id for which `is_live` is false
    pub fn fresh_query_id(&self, is_live: impl Fn(QueryId) -> bool) -> BbqResult<QueryId> {
        for _ in 0..MAX_ATTEMPTS {
            let candidate = QueryId(self.next());
            if !is_live(candidate) {
                return Ok(candidate);
            }
            tracing::trace!(query_id = %candidate, "Query id collision, regenerating");
        }
        Err(BbqError::internal("random source keeps repeating query ids"))
    }

    /// One distinct token per responder
    pub fn fresh_tokens(
        &self,
        responders: impl IntoIterator<Item = ParticipantId>,
    ) -> BbqResult<HashMap<Token, ParticipantId>> {
        let mut tokens = HashMap::new();
        for responder in responders {
            let token = self.fresh_token(|t| tokens.contains_key(&t))?;
            tokens.insert(token, responder);
        }
        Ok(tokens)
    }

    fn fresh_token(&self, is_taken: impl Fn(Token) -> bool) -> BbqResult<Token> {
        for _ in 0..MAX_ATTEMPTS {
            let candidate = Token(self.next());
            if !is_taken(candidate) {
                return Ok(candidate);
            }
            tracing::trace!(token = %candidate, "Token collision, regenerating");
        }
        Err(BbqError::internal("random source keeps repeating tokens"))
    }
}
