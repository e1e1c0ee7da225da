//! Rpc methods.
#![warn(missing_docs)]

use super::error::Error;
use super::error::Result;

/// supported methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Method {
    /// Read a key
    Get,
    /// Insert or overwrite a key
    Put,
    /// Append to the value list of a key
    Append,
    /// Delete a key on every node
    Delete,
    /// A new successor asks its predecessor for the collection
    Join,
    /// Hand the collection to the successor before termination
    Leave,
    /// Start a reconciliation walk at this node
    StartReconciliation,
    /// Retrieve Node info
    NodeInfo,
    /// Announce a node to the registry
    RegisterNode,
    /// Ask the registry for active nodes
    ActiveNodes,
    /// Mark a node as terminating at the registry
    TerminateNode,
}

impl Method {
    /// Return method's name as `&str`
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "get",
            Method::Put => "put",
            Method::Append => "append",
            Method::Delete => "delete",
            Method::Join => "join",
            Method::Leave => "leave",
            Method::StartReconciliation => "startReconciliation",
            Method::NodeInfo => "nodeInfo",
            Method::RegisterNode => "registerNode",
            Method::ActiveNodes => "activeNodes",
            Method::TerminateNode => "terminateNode",
        }
    }
}

#[allow(clippy::to_string_trait_impl)]
impl ToString for Method {
    fn to_string(&self) -> String {
        self.as_str().to_owned()
    }
}

impl TryFrom<&str> for Method {
    type Error = crate::error::Error;

    fn try_from(value: &str) -> Result<Self> {
        Ok(match value {
            "get" => Self::Get,
            "put" => Self::Put,
            "append" => Self::Append,
            "delete" => Self::Delete,
            "join" => Self::Join,
            "leave" => Self::Leave,
            "startReconciliation" => Self::StartReconciliation,
            "nodeInfo" => Self::NodeInfo,
            "registerNode" => Self::RegisterNode,
            "activeNodes" => Self::ActiveNodes,
            "terminateNode" => Self::TerminateNode,
            _ => return Err(Error::InvalidMethod),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for method in [
            Method::Get,
            Method::Append,
            Method::StartReconciliation,
            Method::TerminateNode,
        ] {
            assert_eq!(Method::try_from(method.as_str()).unwrap(), method);
        }
        assert!(Method::try_from("listPeers").is_err());
    }
}
