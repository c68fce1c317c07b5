//! Scheduling-provider gateway
//!
//! Thin HTTP client over the clinic's scheduling API. Every call goes
//! through a single `invoke` seam carrying an `Operation` plus a JSON
//! parameter object; the typed helpers on the trait parse the provider's
//! Portuguese payloads into domain types. Mocks only implement `invoke`.

use crate::session::types::{PatientRecord, Procedure, Professional};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// The fixed set of provider calls the conversation can make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    LookupPatient,
    InsuranceCatalog,
    ClinicCatalog,
    ProceduresByInsurance,
    AvailableProfessionals,
    RegisterAppointment,
}

impl Operation {
    /// Value of the `X-API-METHOD` header the provider multiplexes on.
    pub fn method_token(self) -> &'static str {
        match self {
            Operation::LookupPatient => "buscar_paciente",
            Operation::InsuranceCatalog => "listar_convenios",
            Operation::ClinicCatalog => "listar_clinicas",
            Operation::ProceduresByInsurance => "listar_procedimentos",
            Operation::AvailableProfessionals => "listar_profissionais",
            Operation::RegisterAppointment => "cadastrar_agendamento",
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Operation::RegisterAppointment => "/api/agendamentos",
            _ => "/api/consultas",
        }
    }

    /// Registration posts an HTML-form body; everything else is JSON.
    pub fn form_encoded(self) -> bool {
        matches!(self, Operation::RegisterAppointment)
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("provider returned status {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("provider rejected the request: {0}")]
    Rejected(String),
    #[error("unexpected provider payload: {0}")]
    Payload(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Insurance {
    pub convenio_id: i64,
    pub nome_convenio: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Clinic {
    pub clinica_id: i64,
    pub nome: String,
    #[serde(default)]
    pub endereco: String,
    #[serde(default)]
    pub telefone: String,
}

#[derive(Debug, Deserialize)]
struct WirePatient {
    paciente_id: i64,
    nome: String,
    #[serde(default)]
    convenio_id: Option<i64>,
}

#[async_trait]
pub trait SchedulingGateway: Send + Sync {
    async fn invoke(&self, op: Operation, params: Value) -> Result<Value, GatewayError>;

    /// Look a patient up by normalized phone. Absent is not an error.
    async fn lookup_patient(&self, phone: &str) -> Result<Option<PatientRecord>, GatewayError> {
        let value = self
            .invoke(Operation::LookupPatient, json!({ "telefone": phone }))
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        // The provider answers a singleton list or a bare object.
        let record = match value {
            Value::Array(items) => match items.into_iter().next() {
                Some(item) => item,
                None => return Ok(None),
            },
            other => other,
        };
        let wire: WirePatient = serde_json::from_value(record)
            .map_err(|e| GatewayError::Payload(format!("patient record: {e}")))?;
        Ok(Some(PatientRecord {
            patient_id: Some(wire.paciente_id),
            name: wire.nome,
            insurance_id: wire.convenio_id,
        }))
    }

    async fn insurance_catalog(&self) -> Result<Vec<Insurance>, GatewayError> {
        let value = self
            .invoke(Operation::InsuranceCatalog, json!({}))
            .await?;
        serde_json::from_value(value)
            .map_err(|e| GatewayError::Payload(format!("insurance catalog: {e}")))
    }

    async fn clinic_catalog(&self) -> Result<Vec<Clinic>, GatewayError> {
        let value = self.invoke(Operation::ClinicCatalog, json!({})).await?;
        serde_json::from_value(value)
            .map_err(|e| GatewayError::Payload(format!("clinic catalog: {e}")))
    }

    /// Procedures covered by the given insurance at the given clinics.
    async fn procedures_by_insurance(
        &self,
        insurance_id: Option<i64>,
        clinic_ids: &[i64],
    ) -> Result<Vec<Procedure>, GatewayError> {
        let value = self
            .invoke(
                Operation::ProceduresByInsurance,
                json!({ "convenio_id": insurance_id, "clinica_ids": clinic_ids }),
            )
            .await?;
        serde_json::from_value(value)
            .map_err(|e| GatewayError::Payload(format!("procedure list: {e}")))
    }

    /// Professionals with open slots for a procedure on a date
    /// (DD/MM/YYYY), restricted to the chosen clinics.
    async fn available_professionals(
        &self,
        clinic_ids: &[i64],
        procedure_id: i64,
        date: &str,
    ) -> Result<Vec<Professional>, GatewayError> {
        let value = self
            .invoke(
                Operation::AvailableProfessionals,
                json!({
                    "clinica_ids": clinic_ids,
                    "procedimento_id": procedure_id,
                    "data": date,
                }),
            )
            .await?;
        serde_json::from_value(value)
            .map_err(|e| GatewayError::Payload(format!("professional list: {e}")))
    }

    async fn register_appointment(&self, payload: Value) -> Result<Value, GatewayError> {
        self.invoke(Operation::RegisterAppointment, payload).await
    }
}

#[async_trait]
impl<T: SchedulingGateway + ?Sized> SchedulingGateway for std::sync::Arc<T> {
    async fn invoke(&self, op: Operation, params: Value) -> Result<Value, GatewayError> {
        (**self).invoke(op, params).await
    }
}

pub struct HttpSchedulingGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpSchedulingGateway {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn form_fields(params: &Value) -> Vec<(String, String)> {
        let Value::Object(map) = params else {
            return Vec::new();
        };
        map.iter()
            .map(|(k, v)| {
                let rendered = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), rendered)
            })
            .collect()
    }
}

#[async_trait]
impl SchedulingGateway for HttpSchedulingGateway {
    async fn invoke(&self, op: Operation, params: Value) -> Result<Value, GatewayError> {
        let url = format!("{}{}", self.base_url, op.path());
        let request = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .header("X-API-METHOD", op.method_token());
        let request = if op.form_encoded() {
            request.form(&Self::form_fields(&params))
        } else {
            request.json(&params)
        };

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(GatewayError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| GatewayError::Payload(format!("non-JSON body: {e}")))?;
        if let Some(message) = value.get("erro").and_then(Value::as_str) {
            return Err(GatewayError::Rejected(message.to_string()));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSchedulingGateway;

    #[tokio::test]
    async fn lookup_patient_unwraps_singleton_list() {
        let mock = MockSchedulingGateway::new();
        mock.queue_ok(
            Operation::LookupPatient,
            json!([{ "paciente_id": 42, "nome": "Maria Souza", "convenio_id": 3 }]),
        );
        let patient = mock.lookup_patient("5592988887777").await.unwrap().unwrap();
        assert_eq!(patient.patient_id, Some(42));
        assert_eq!(patient.name, "Maria Souza");
        assert_eq!(patient.insurance_id, Some(3));
    }

    #[tokio::test]
    async fn lookup_patient_absent_is_none() {
        let mock = MockSchedulingGateway::new();
        mock.queue_ok(Operation::LookupPatient, json!([]));
        assert!(mock.lookup_patient("559200000000").await.unwrap().is_none());

        let mock = MockSchedulingGateway::new();
        mock.queue_ok(Operation::LookupPatient, Value::Null);
        assert!(mock.lookup_patient("559200000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn catalogs_parse_provider_field_names() {
        let mock = MockSchedulingGateway::new();
        mock.queue_ok(
            Operation::InsuranceCatalog,
            json!([{ "convenio_id": 1, "nome_convenio": "Unimed" }]),
        );
        let insurances = mock.insurance_catalog().await.unwrap();
        assert_eq!(insurances[0].nome_convenio, "Unimed");

        mock.queue_ok(
            Operation::ProceduresByInsurance,
            json!([{ "id": 7, "nome": "Fisioterapia Ortopédica" }]),
        );
        let procedures = mock.procedures_by_insurance(Some(1), &[1, 3]).await.unwrap();
        assert_eq!(procedures[0].id, 7);
        assert_eq!(procedures[0].name, "Fisioterapia Ortopédica");
    }

    #[tokio::test]
    async fn malformed_payload_surfaces_as_payload_error() {
        let mock = MockSchedulingGateway::new();
        mock.queue_ok(Operation::InsuranceCatalog, json!({ "unexpected": true }));
        let err = mock.insurance_catalog().await.unwrap_err();
        assert!(matches!(err, GatewayError::Payload(_)));
    }

    #[test]
    fn operation_routing_constants() {
        assert_eq!(Operation::LookupPatient.method_token(), "buscar_paciente");
        assert_eq!(Operation::RegisterAppointment.path(), "/api/agendamentos");
        assert!(Operation::RegisterAppointment.form_encoded());
        assert!(!Operation::AvailableProfessionals.form_encoded());
    }

    #[test]
    fn form_fields_render_scalars_plainly() {
        let fields = HttpSchedulingGateway::form_fields(&json!({
            "nome": "Ana",
            "convenio_id": 3,
        }));
        assert!(fields.contains(&("nome".to_string(), "Ana".to_string())));
        assert!(fields.contains(&("convenio_id".to_string(), "3".to_string())));
    }
}
