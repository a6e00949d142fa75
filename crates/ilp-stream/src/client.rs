//! The sending side: push money to a generated address over a plugin.

use chrono::{Duration, Utc};
use ilp_packet::{Address, Amount, Packet, PrepareBuilder};
use ilp_plugin::Plugin;
use log::{debug, trace};

use crate::crypto;
use crate::error::StreamError;
use crate::packet::{decrypt_frames, encrypt_frames, Frame};

const PACKET_EXPIRY: i64 = 30;
const MONEY_STREAM_ID: u64 = 1;

/// Sends `source_amount` to `destination`, chunking to respect the
/// receiver's advertised limits.
///
/// Resolves with the amount actually delivered. That can be less than
/// requested: when the receiver advertises that it is full, delivery
/// stops there rather than failing, and the caller decides what a
/// partial payment means.
pub async fn send_money<P: Plugin + ?Sized>(
    plugin: &P,
    destination: &Address,
    shared_secret: &[u8; 32],
    source_amount: u64,
) -> Result<u64, StreamError> {
    let mut amount_left = source_amount;
    let mut delivered = 0u64;
    // What the receiver has told us so far; unknown until the first
    // advertisement arrives.
    let mut remote_max: Option<u64> = None;
    let mut remote_received: u64 = 0;

    while amount_left > 0 {
        let chunk = match remote_max {
            Some(max) => {
                let headroom = max.saturating_sub(remote_received);
                if headroom == 0 {
                    debug!(
                        "receiver is full after {} of {} units",
                        delivered, source_amount
                    );
                    return Ok(delivered);
                }
                amount_left.min(headroom)
            }
            None => amount_left,
        };
        let is_end = chunk == amount_left;

        let frames = [Frame::StreamMoney {
            stream_id: MONEY_STREAM_ID,
            amount: chunk,
            is_end,
        }];
        let data = encrypt_frames(shared_secret, &frames);
        let execution_condition = crypto::generate_condition(shared_secret, &data);
        let prepare = PrepareBuilder {
            amount: Amount::from(chunk),
            expires_at: Utc::now() + Duration::seconds(PACKET_EXPIRY),
            execution_condition: &execution_condition,
            destination: destination.clone(),
            data: &data,
        }
        .build()?;

        let response = plugin.send_data(prepare.serialize()).await?;
        match Packet::deserialize(&response)? {
            Packet::Fulfill(fulfill) => {
                let expected = crypto::generate_fulfillment(shared_secret, &data);
                if fulfill.fulfillment() != &expected {
                    return Err(StreamError::InvalidFulfillment);
                }
                delivered += chunk;
                amount_left -= chunk;
                trace!("delivered {} units, {} to go", chunk, amount_left);
                if let Ok(frames) = decrypt_frames(shared_secret, fulfill.data()) {
                    apply_advertisements(&frames, &mut remote_max, &mut remote_received);
                }
            }
            Packet::Reject(reject) => {
                let before = (remote_max, remote_received);
                if let Ok(frames) = decrypt_frames(shared_secret, reject.data()) {
                    apply_advertisements(&frames, &mut remote_max, &mut remote_received);
                }
                let headroom = remote_max
                    .map(|max| max.saturating_sub(remote_received))
                    .unwrap_or(0);
                if headroom == 0 && before != (remote_max, remote_received) {
                    // The receiver told us it is full.
                    return Ok(delivered);
                }
                if headroom > 0 && headroom < chunk {
                    debug!("retrying with {} units instead of {}", headroom, chunk);
                    continue;
                }
                return Err(StreamError::Rejected(reject.into()));
            }
            Packet::Prepare(_) => return Err(StreamError::UnexpectedPacket),
        }
    }

    Ok(delivered)
}

fn apply_advertisements(frames: &[Frame], remote_max: &mut Option<u64>, remote_received: &mut u64) {
    for frame in frames {
        if let Frame::StreamMoneyMax {
            stream_id,
            receive_max,
            total_received,
        } = frame
        {
            if *stream_id != MONEY_STREAM_ID {
                continue;
            }
            // Advertisements only ever move forward; a reordered reply
            // must not shrink what we already learned.
            *remote_max = Some(remote_max.unwrap_or(0).max(*receive_max));
            *remote_received = (*remote_received).max(*total_received);
        }
    }
}
