//! Coordinator Policies
//!
//! Behaviours the lobby protocol leaves open. By default leaders are
//! never reassigned, re-joining resets the score,
//! and every client is trusted.

use std::str::FromStr;
use thiserror::Error;

/// What happens to leadership when the leader leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeaderPolicy {
    /// Keep the departed leader's name.
    #[default]
    Retain,
    /// Hand leadership to the earliest-joined remaining player.
    TransferToEarliest,
}

/// Score handling when a name joins a lobby it is already in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RejoinPolicy {
    /// Reset the score to zero.
    #[default]
    ResetScore,
    /// Keep the existing score.
    PreserveScore,
}

/// How far the coordinator trusts what clients claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthorizationPolicy {
    /// Accept any request from any connection.
    #[default]
    TrustClients,
    /// Check requests against the name the connection joined with:
    /// buzz only as yourself, leader-only question selection and game start,
    /// score updates only for yourself or by the leader.
    BoundIdentity,
}

/// All coordinator policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoordinatorPolicy {
    /// Leader handling.
    pub leader: LeaderPolicy,
    /// Re-join handling.
    pub rejoin: RejoinPolicy,
    /// Request authorization.
    pub authorization: AuthorizationPolicy,
}

/// Unrecognised policy name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} policy: {value:?}")]
pub struct ParsePolicyError {
    /// Which policy was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl ParsePolicyError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

impl FromStr for LeaderPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retain" => Ok(Self::Retain),
            "transfer" | "transfer_to_earliest" => Ok(Self::TransferToEarliest),
            _ => Err(ParsePolicyError::new("leader", s)),
        }
    }
}

impl FromStr for RejoinPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reset" | "reset_score" => Ok(Self::ResetScore),
            "preserve" | "preserve_score" => Ok(Self::PreserveScore),
            _ => Err(ParsePolicyError::new("rejoin", s)),
        }
    }
}

impl FromStr for AuthorizationPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trust" | "trust_clients" => Ok(Self::TrustClients),
            "bound" | "bound_identity" => Ok(Self::BoundIdentity),
            _ => Err(ParsePolicyError::new("authorization", s)),
        }
    }
}
