use crate::api::{ManagementReply, ManagementRequest};
use crate::error::Result;
use crate::topology::ClusterTopology;

/// Codec for everything that leaves the process: persisted topologies and
/// management traffic.
pub trait TopologySerializer: Send + Sync {
    fn encode_topology(&self, topology: &ClusterTopology) -> Result<Vec<u8>>;
    fn decode_topology(&self, bytes: &[u8]) -> Result<ClusterTopology>;

    fn encode_request(&self, request: &ManagementRequest) -> Result<Vec<u8>>;
    fn decode_request(&self, bytes: &[u8]) -> Result<ManagementRequest>;

    fn encode_reply(&self, reply: &ManagementReply) -> Result<Vec<u8>>;
    fn decode_reply(&self, bytes: &[u8]) -> Result<ManagementReply>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl TopologySerializer for JsonSerializer {
    fn encode_topology(&self, topology: &ClusterTopology) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(topology)?)
    }

    fn decode_topology(&self, bytes: &[u8]) -> Result<ClusterTopology> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn encode_request(&self, request: &ManagementRequest) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(request)?)
    }

    fn decode_request(&self, bytes: &[u8]) -> Result<ManagementRequest> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn encode_reply(&self, reply: &ManagementReply) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(reply)?)
    }

    fn decode_reply(&self, bytes: &[u8]) -> Result<ManagementReply> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::api::{ClusterChangeResponse, ManagementResponse};
    use crate::error::{Error, ErrorCode, ErrorResponse};
    use crate::topology::{MemberState, PartitionState, TopologyChangeOperation};

    #[test]
    fn topology_with_pending_change_survives_encoding() {
        let topology = ClusterTopology::init()
            .add_member(
                "1",
                MemberState::active(BTreeMap::from([(1, PartitionState::active(1))])),
            )
            .start_topology_change(
                vec![
                    TopologyChangeOperation::member_join("2"),
                    TopologyChangeOperation::partition_join("2", 1, 1),
                ],
                1_700_000_000,
            )
            .unwrap();

        let bytes = JsonSerializer.encode_topology(&topology).unwrap();
        assert_eq!(JsonSerializer.decode_topology(&bytes).unwrap(), topology);
    }

    #[test]
    fn error_reply_keeps_its_code() {
        let reply: ManagementReply = Err(ErrorResponse::from(&Error::validation("bad member")));
        let bytes = JsonSerializer.encode_reply(&reply).unwrap();
        let decoded = JsonSerializer.decode_reply(&bytes).unwrap();
        assert_eq!(decoded.unwrap_err().code, ErrorCode::InvalidRequest);

        let ok: ManagementReply = Ok(ManagementResponse::Topology(ClusterTopology::init()));
        let bytes = JsonSerializer.encode_reply(&ok).unwrap();
        assert_eq!(JsonSerializer.decode_reply(&bytes).unwrap(), ok);
    }

    #[test]
    fn replies_with_partitions_survive_encoding() {
        let topology = ClusterTopology::init().add_member(
            "1",
            MemberState::active(BTreeMap::from([
                (1, PartitionState::active(2)),
                (2, PartitionState::joining(1)),
            ])),
        );

        let reply: ManagementReply = Ok(ManagementResponse::Topology(topology.clone()));
        let bytes = JsonSerializer.encode_reply(&reply).unwrap();
        assert_eq!(JsonSerializer.decode_reply(&bytes).unwrap(), reply);

        let change: ManagementReply = Ok(ManagementResponse::ClusterChange(ClusterChangeResponse {
            change_id: 1,
            current_topology: topology.clone(),
            expected_topology: topology,
            planned_changes: vec![TopologyChangeOperation::partition_leave("1", 2)],
        }));
        let bytes = JsonSerializer.encode_reply(&change).unwrap();
        assert_eq!(JsonSerializer.decode_reply(&bytes).unwrap(), change);
    }

    #[test]
    fn garbage_is_a_serialization_error() {
        let err = JsonSerializer.decode_topology(b"not json").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
