use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU32, Ordering},
};

use gramlink_core::{
    constants::{MULTIPART_HEADER_SIZE, MULTIPART_TYPE},
    error::{ErrorKind, Result},
};
use gramlink_protocol::{Message, MultipartHeader};

use super::Peer;

/// Process-wide so fragments from two links in one process never share an id.
static NEXT_MSG_ID: AtomicU32 = AtomicU32::new(1);

/// Places `message` behind any priority messages already queued, or at the back.
fn enqueue(queue: &mut VecDeque<Message>, message: Message) {
    if message.is_priority() {
        let position = queue.iter().take_while(|queued| queued.is_priority()).count();
        queue.insert(position, message);
    } else {
        queue.push_back(message);
    }
}

impl Peer {
    /// Queues a message for this peer, fragmenting it when it exceeds `chunk_size`.
    ///
    /// Fragments of a scatter message go to the multipart queue and leave one per
    /// datagram; all other fragments share the regular queue. The whole message is
    /// refused with `SendOverflow` if it would push the queues past `max_queue_bytes`.
    pub fn send_message(&mut self, message: Message) -> Result<()> {
        let chunk_size = self.config.chunk_size;
        if message.payload().len() <= chunk_size {
            self.reserve_send_bytes(message.wire_size())?;
            enqueue(&mut self.send_queue, message);
            return Ok(());
        }

        let fragments = self.fragment(&message)?;
        let bytes = fragments.iter().map(Message::wire_size).sum();
        self.reserve_send_bytes(bytes)?;

        let queue = if message.is_scatter() { &mut self.multipart_send_queue } else { &mut self.send_queue };
        for fragment in fragments {
            enqueue(queue, fragment);
        }
        Ok(())
    }

    fn fragment(&self, message: &Message) -> Result<Vec<Message>> {
        let chunk_size = self.config.chunk_size;
        let payload = message.payload();
        let total_parts = u16::try_from(payload.len().div_ceil(chunk_size))
            .map_err(|_| ErrorKind::MessageTooLarge(payload.len()))?;
        let total_len =
            u32::try_from(payload.len()).map_err(|_| ErrorKind::MessageTooLarge(payload.len()))?;
        let msg_id = NEXT_MSG_ID.fetch_add(1, Ordering::Relaxed);

        let mut fragments = Vec::with_capacity(total_parts as usize);
        for (index, chunk) in payload.chunks(chunk_size).enumerate() {
            let header = MultipartHeader {
                inner_kind: message.kind(),
                flags: message.flags(),
                msg_id,
                part_no: index as u16 + 1,
                total_parts,
                total_len,
            };
            let mut body = Vec::with_capacity(MULTIPART_HEADER_SIZE + chunk.len());
            header.write_to(&mut body)?;
            body.extend_from_slice(chunk);
            fragments.push(Message::new(self.peer_id, MULTIPART_TYPE, body, message.flags()));
        }

        tracing::trace!(
            "Split {} bytes for peer {} into {} fragments (message {})",
            payload.len(),
            self.peer_id,
            total_parts,
            msg_id
        );
        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use gramlink_core::config::{LinkConfig, PeerLimits};
    use gramlink_protocol::MessageFlags;

    use super::*;
    use crate::PeerStatus;

    fn peer_with(config: LinkConfig) -> Peer {
        Peer::new("127.0.0.1:7000".parse().unwrap(), 1, &config, Instant::now())
    }

    #[test]
    fn test_small_message_not_fragmented() {
        let mut peer = peer_with(LinkConfig::default());
        peer.send_message(Message::new(1, 5, vec![0; 232], MessageFlags::UNRELIABLE)).unwrap();
        assert_eq!(peer.send_queue_len(), 1);
        assert_eq!(peer.queued_send_bytes(), 234);
    }

    #[test]
    fn test_fragment_count_and_sizes() {
        let mut peer = peer_with(LinkConfig::default());
        peer.send_message(Message::new(1, 5, vec![7; 1000], MessageFlags::RELIABLE)).unwrap();

        assert_eq!(peer.send_queue_len(), 5);
        let sizes: Vec<usize> = peer
            .send_queue
            .iter()
            .map(|f| f.payload().len() - MULTIPART_HEADER_SIZE)
            .collect();
        assert_eq!(sizes, vec![232, 232, 232, 232, 72]);
        assert!(peer.send_queue.iter().all(Message::is_multipart));
    }

    #[test]
    fn test_scatter_fragments_use_multipart_queue() {
        let mut peer = peer_with(LinkConfig::default());
        peer.send_message(Message::new(1, 5, vec![7; 500], MessageFlags::RELIABLE.with_scatter()))
            .unwrap();
        assert_eq!(peer.send_queue_len(), 0);
        assert_eq!(peer.multipart_send_queue_len(), 3);
    }

    #[test]
    fn test_fragments_share_one_message_id() {
        let peer = peer_with(LinkConfig::default());
        let fragments = peer.fragment(&Message::new(1, 5, vec![1; 600], MessageFlags::UNRELIABLE)).unwrap();
        let headers: Vec<MultipartHeader> =
            fragments.iter().map(|f| MultipartHeader::parse(f.payload()).unwrap().0).collect();
        assert!(headers.iter().all(|h| h.msg_id == headers[0].msg_id));
        assert_eq!(headers.iter().map(|h| h.part_no).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(headers.iter().all(|h| h.total_len == 600 && h.inner_kind == 5));
    }

    #[test]
    fn test_priority_jumps_queue_in_order() {
        let mut peer = peer_with(LinkConfig::default());
        peer.send_message(Message::new(1, 1, vec![1], MessageFlags::UNRELIABLE)).unwrap();
        peer.send_message(Message::new(1, 2, vec![2], MessageFlags::UNRELIABLE.with_priority())).unwrap();
        peer.send_message(Message::new(1, 3, vec![3], MessageFlags::UNRELIABLE.with_priority())).unwrap();
        peer.send_message(Message::new(1, 4, vec![4], MessageFlags::UNRELIABLE)).unwrap();

        let kinds: Vec<u8> = peer.send_queue.iter().map(Message::kind).collect();
        assert_eq!(kinds, vec![2, 3, 1, 4]);
    }

    #[test]
    fn test_queue_cap_refuses_whole_message() {
        let config = LinkConfig {
            peer_limits: PeerLimits { max_queue_bytes: Some(300), ..Default::default() },
            ..Default::default()
        };
        let mut peer = peer_with(config);
        peer.send_message(Message::new(1, 5, vec![0; 200], MessageFlags::UNRELIABLE)).unwrap();

        let refused = peer.send_message(Message::new(1, 5, vec![0; 200], MessageFlags::UNRELIABLE));
        assert!(matches!(refused, Err(ErrorKind::SendOverflow)));
        assert_eq!(peer.status(), PeerStatus::SendOverflow);
        assert_eq!(peer.send_queue_len(), 1);
        assert_eq!(peer.queued_send_bytes(), 202);
        assert_eq!(peer.statistics().send_overflows, 1);

        peer.reset_status();
        assert!(peer.status().is_ok());
    }
}
