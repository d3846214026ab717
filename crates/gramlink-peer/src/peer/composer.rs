use std::time::Instant;

use gramlink_protocol::Datagram;

use super::Peer;

impl Peer {
    /// Packs queued traffic into the next datagram, if there is any.
    ///
    /// Whole messages are taken from the front of the send queue while they fit the
    /// body budget. Only when that queue is empty does a single scatter fragment go
    /// out, always reliably. A message that could not fit even an empty datagram is
    /// dropped.
    pub fn compose_gram(&mut self, now: Instant) -> Option<Datagram> {
        let budget = self.config.body_budget();
        let mut packed = Vec::new();
        let mut used = 0;

        while let Some(front) = self.send_queue.front() {
            let size = front.wire_size();
            if size > budget {
                if let Some(dropped) = self.send_queue.pop_front() {
                    self.release_send_bytes(size);
                    self.statistics.oversized_drops += 1;
                    tracing::debug!(
                        "Dropping {}-byte message of type {} for peer {}: exceeds the {}-byte datagram body",
                        dropped.payload().len(),
                        dropped.kind(),
                        self.peer_id,
                        budget
                    );
                }
                continue;
            }
            if used + size > budget {
                break;
            }
            if let Some(message) = self.send_queue.pop_front() {
                self.release_send_bytes(size);
                used += size;
                packed.push(message);
            }
        }

        let address = self.address;
        let max_retries = self.config.max_retries;
        let packing = if !packed.is_empty() {
            let sequence = self.allocate_sequence();
            Datagram::pack(address, sequence, packed, max_retries, now)
        } else {
            let fragment = self.multipart_send_queue.pop_front()?;
            self.release_send_bytes(fragment.wire_size());
            let sequence = self.allocate_sequence();
            Datagram::pack_fragment(address, sequence, fragment, max_retries, now)
        };

        match packing {
            Ok(gram) => Some(gram),
            Err(err) => {
                tracing::debug!("Failed to pack datagram for peer {}: {}", self.peer_id, err);
                None
            }
        }
    }
}
