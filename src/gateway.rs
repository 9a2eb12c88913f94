// Copyright 2022-2023 Gloam Devs
//
// This library is free software; you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public
// License as published by the Free Software Foundation; either
// version 3 of the License, or (at your option) any later version.
//
// This library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this library; if not, write to the Free Software
// Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301, USA

//! The narrow host interface the swap core drives its environment
//! through: bundle transport, chain observation and lifecycle hooks.

use std::error;

use thiserror::Error;

use crate::blockchain::Height;
use crate::messages::TxParameters;
use crate::params::TxId;
use crate::swap::FailureReason;
use crate::transaction::KernelId;

/// Transport-level errors surfaced by a gateway. A send failure is
/// retriable: the driver leaves the state untouched and re-derives the
/// same bundle on the next tick.
#[derive(Error, Debug)]
pub enum Error {
    /// The transport refused or failed to accept the bundle.
    #[error("Failed to send transaction parameters: {0}")]
    SendFailed(Box<dyn error::Error + Send + Sync>),
}

impl Error {
    pub fn send_failed<E>(error: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Self::SendFailed(error.into())
    }
}

/// Capability handle over the host: message-bus transport and node
/// client. A transaction never outlives its gateway.
pub trait Gateway {
    /// Hand an outgoing bundle to the transport. At-least-once delivery;
    /// the receiving side dedups by store content and state.
    fn send_tx_parameters(&mut self, msg: TxParameters) -> Result<(), Error>;

    /// Current chain tip height, used for expiry checks.
    fn tip_height(&self) -> Height;

    /// Height at which the given kernel was observed on-chain, if any.
    fn confirmed_height(&self, kernel_id: &KernelId) -> Option<Height>;

    /// Lifecycle hook: the swap reached its terminal success state.
    fn on_tx_completed(&mut self, tx_id: TxId);

    /// Lifecycle hook: the swap reached a terminal failure state.
    fn on_tx_failed(&mut self, tx_id: TxId, reason: FailureReason);
}

impl<G: Gateway> Gateway for &mut G {
    fn send_tx_parameters(&mut self, msg: TxParameters) -> Result<(), Error> {
        (**self).send_tx_parameters(msg)
    }

    fn tip_height(&self) -> Height {
        (**self).tip_height()
    }

    fn confirmed_height(&self, kernel_id: &KernelId) -> Option<Height> {
        (**self).confirmed_height(kernel_id)
    }

    fn on_tx_completed(&mut self, tx_id: TxId) {
        (**self).on_tx_completed(tx_id)
    }

    fn on_tx_failed(&mut self, tx_id: TxId, reason: FailureReason) {
        (**self).on_tx_failed(tx_id, reason)
    }
}
