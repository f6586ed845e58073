// src/models/webhook.rs
//
// Payloads dos webhooks do ERP. O tipo de evento vem da rota e é resolvido
// ANTES do parse, então cada caminho de ingestão tem um tipo estreito.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::common::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WebhookKind {
    PosVerification,
    PosSession,
    Shift,
    Attendance,
    Order,
    CashMovement,
}

impl FromStr for WebhookKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pos-verification" => Ok(WebhookKind::PosVerification),
            "pos-session" => Ok(WebhookKind::PosSession),
            "shift" => Ok(WebhookKind::Shift),
            "attendance" => Ok(WebhookKind::Attendance),
            "order" => Ok(WebhookKind::Order),
            "cash-movement" => Ok(WebhookKind::CashMovement),
            other => Err(AppError::InvalidPayload(format!("tipo de evento desconhecido: {}", other))),
        }
    }
}

// =============================================================================
//  Helpers de desserialização (o ERP manda `false` no lugar de vazio,
//  many2one como [id, "nome"] e datas "YYYY-MM-DD HH:MM:SS" em UTC)
// =============================================================================

/// Referência many2one do ERP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErpRef {
    pub id: i64,
    pub name: Option<String>,
}

fn parse_ref(v: &Value) -> Option<ErpRef> {
    match v {
        Value::Number(n) => n.as_i64().map(|id| ErpRef { id, name: None }),
        Value::String(s) => s.trim().parse().ok().map(|id| ErpRef { id, name: None }),
        Value::Array(items) => {
            let id = items.first().and_then(Value::as_i64)?;
            let name = items.get(1).and_then(Value::as_str).map(str::to_string);
            Some(ErpRef { id, name })
        }
        _ => None,
    }
}

pub fn parse_erp_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn decimal_from_value(v: &Value) -> Option<Decimal> {
    match v {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn is_empty_erp_value(v: &Value) -> bool {
    matches!(v, Value::Null | Value::Bool(false)) || v.as_str().is_some_and(|s| s.trim().is_empty())
}

fn many2one<'de, D: Deserializer<'de>>(d: D) -> Result<ErpRef, D::Error> {
    let v = Value::deserialize(d)?;
    parse_ref(&v).ok_or_else(|| serde::de::Error::custom(format!("referência inválida: {}", v)))
}

fn many2one_opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<ErpRef>, D::Error> {
    let v = Value::deserialize(d)?;
    if is_empty_erp_value(&v) {
        return Ok(None);
    }
    parse_ref(&v)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("referência inválida: {}", v)))
}

fn datetime_opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    let v = Value::deserialize(d)?;
    if is_empty_erp_value(&v) {
        return Ok(None);
    }
    v.as_str()
        .and_then(parse_erp_datetime)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("data inválida: {}", v)))
}

fn decimal_opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Decimal>, D::Error> {
    let v = Value::deserialize(d)?;
    if is_empty_erp_value(&v) {
        return Ok(None);
    }
    decimal_from_value(&v)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("número inválido: {}", v)))
}

fn string_opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = Value::deserialize(d)?;
    if is_empty_erp_value(&v) {
        return Ok(None);
    }
    match v {
        Value::String(s) => Ok(Some(s)),
        other => Ok(Some(other.to_string())),
    }
}

// =============================================================================
//  Payloads (um por tipo de evento)
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ShiftEvent {
    #[serde(rename = "_action", default)]
    pub action: String,
    pub id: i64,
    #[serde(deserialize_with = "many2one")]
    pub x_company_id: ErpRef,
    #[serde(default, deserialize_with = "many2one_opt")]
    pub employee_id: Option<ErpRef>,
    #[serde(default, deserialize_with = "many2one_opt")]
    pub x_branch_id: Option<ErpRef>,
    #[serde(default, deserialize_with = "datetime_opt")]
    pub start_datetime: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "datetime_opt")]
    pub end_datetime: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "decimal_opt")]
    pub allocated_hours: Option<Decimal>,
    #[serde(default, deserialize_with = "decimal_opt")]
    pub worked_hours: Option<Decimal>,
    #[serde(default, deserialize_with = "string_opt")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceEvent {
    #[serde(rename = "_action", default)]
    pub action: String,
    pub id: i64,
    #[serde(deserialize_with = "many2one")]
    pub x_company_id: ErpRef,
    #[serde(default, deserialize_with = "many2one_opt")]
    pub employee_id: Option<ErpRef>,
    // Turno do ERP ao qual a marcação pertence
    #[serde(default, deserialize_with = "many2one_opt")]
    pub x_shift_id: Option<ErpRef>,
    #[serde(default, deserialize_with = "datetime_opt")]
    pub check_in: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "datetime_opt")]
    pub check_out: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "decimal_opt")]
    pub worked_hours: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PosSessionEvent {
    #[serde(rename = "_action", default)]
    pub action: String,
    pub id: i64,
    #[serde(rename = "branchId", deserialize_with = "many2one")]
    pub branch_id: ErpRef,
    #[serde(default, deserialize_with = "string_opt")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "string_opt")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "many2one_opt")]
    pub user_id: Option<ErpRef>,
    #[serde(default, deserialize_with = "datetime_opt")]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "datetime_opt")]
    pub stop_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PosVerificationEvent {
    #[serde(rename = "_action", default)]
    pub action: String,
    pub id: i64,
    #[serde(deserialize_with = "many2one")]
    pub company_id: ErpRef,
    #[serde(default, deserialize_with = "many2one_opt")]
    pub session_id: Option<ErpRef>,
    #[serde(default, deserialize_with = "many2one_opt")]
    pub employee_id: Option<ErpRef>,
    #[serde(default, deserialize_with = "string_opt")]
    pub result: Option<String>,
    #[serde(default, deserialize_with = "datetime_opt")]
    pub verified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderEvent {
    #[serde(rename = "_action", default)]
    pub action: String,
    pub id: i64,
    #[serde(deserialize_with = "many2one")]
    pub company_id: ErpRef,
    #[serde(default, deserialize_with = "many2one_opt")]
    pub session_id: Option<ErpRef>,
    #[serde(default, deserialize_with = "string_opt")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "string_opt")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "decimal_opt")]
    pub amount_total: Option<Decimal>,
    #[serde(default, deserialize_with = "datetime_opt")]
    pub date_order: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CashMovementEvent {
    #[serde(rename = "_action", default)]
    pub action: String,
    pub id: i64,
    #[serde(deserialize_with = "many2one")]
    pub company_id: ErpRef,
    #[serde(default, deserialize_with = "many2one_opt")]
    pub session_id: Option<ErpRef>,
    #[serde(default, deserialize_with = "decimal_opt")]
    pub amount: Option<Decimal>,
    #[serde(default, deserialize_with = "string_opt")]
    pub payment_ref: Option<String>,
    #[serde(default, deserialize_with = "datetime_opt")]
    pub date: Option<DateTime<Utc>>,
}

/// União etiquetada dos eventos do ERP.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    PosVerification(PosVerificationEvent),
    PosSession(PosSessionEvent),
    Shift(ShiftEvent),
    Attendance(AttendanceEvent),
    Order(OrderEvent),
    CashMovement(CashMovementEvent),
}

impl WebhookEvent {
    pub fn parse(kind: WebhookKind, body: Value) -> Result<Self, AppError> {
        fn narrow<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, AppError> {
            serde_json::from_value(body).map_err(|e| AppError::InvalidPayload(e.to_string()))
        }

        Ok(match kind {
            WebhookKind::PosVerification => WebhookEvent::PosVerification(narrow(body)?),
            WebhookKind::PosSession => WebhookEvent::PosSession(narrow(body)?),
            WebhookKind::Shift => WebhookEvent::Shift(narrow(body)?),
            WebhookKind::Attendance => WebhookEvent::Attendance(narrow(body)?),
            WebhookKind::Order => WebhookEvent::Order(narrow(body)?),
            WebhookKind::CashMovement => WebhookEvent::CashMovement(narrow(body)?),
        })
    }

    pub fn kind(&self) -> WebhookKind {
        match self {
            WebhookEvent::PosVerification(_) => WebhookKind::PosVerification,
            WebhookEvent::PosSession(_) => WebhookKind::PosSession,
            WebhookEvent::Shift(_) => WebhookKind::Shift,
            WebhookEvent::Attendance(_) => WebhookKind::Attendance,
            WebhookEvent::Order(_) => WebhookKind::Order,
            WebhookEvent::CashMovement(_) => WebhookKind::CashMovement,
        }
    }

    /// Id numérico da empresa no ERP. O nome do campo varia por tipo de evento.
    pub fn erp_company_id(&self) -> i64 {
        match self {
            WebhookEvent::PosVerification(e) => e.company_id.id,
            WebhookEvent::PosSession(e) => e.branch_id.id,
            WebhookEvent::Shift(e) => e.x_company_id.id,
            WebhookEvent::Attendance(e) => e.x_company_id.id,
            WebhookEvent::Order(e) => e.company_id.id,
            WebhookEvent::CashMovement(e) => e.company_id.id,
        }
    }

    pub fn external_id(&self) -> i64 {
        match self {
            WebhookEvent::PosVerification(e) => e.id,
            WebhookEvent::PosSession(e) => e.id,
            WebhookEvent::Shift(e) => e.id,
            WebhookEvent::Attendance(e) => e.id,
            WebhookEvent::Order(e) => e.id,
            WebhookEvent::CashMovement(e) => e.id,
        }
    }

    pub fn action(&self) -> &str {
        match self {
            WebhookEvent::PosVerification(e) => &e.action,
            WebhookEvent::PosSession(e) => &e.action,
            WebhookEvent::Shift(e) => &e.action,
            WebhookEvent::Attendance(e) => &e.action,
            WebhookEvent::Order(e) => &e.action,
            WebhookEvent::CashMovement(e) => &e.action,
        }
    }

    pub fn is_delete(&self) -> bool {
        is_delete_action(self.action())
    }
}

pub fn is_delete_action(action: &str) -> bool {
    action.to_lowercase().contains("delete")
}

/// Resultado da projeção devolvido no envelope `{ success, data }`.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectionOutcome {
    #[serde(skip)]
    pub deleted: bool,
    pub data: Value,
}
