//! Solidity bindings for the incentive market and its collaborators.

use alloy::sol;

sol! {
    /// The vote-incentive market contract.
    ///
    /// Two deposit shapes exist on the wire: [`IncentiveMarket::IncentiveDeposited`] is keyed by
    /// an opaque vote identifier plus a numeric choice, and
    /// [`IncentiveMarket::ProtocolIncentivized`] names the target protocol directly. Claim and
    /// refund events form the settled ledger.
    #[derive(Debug, PartialEq, Eq)]
    contract IncentiveMarket {
        /// An incentive deposited against a numeric choice of an identified vote round.
        event IncentiveDeposited(
            bytes32 indexed voteId,
            address indexed depositor,
            address token,
            uint256 amount,
            uint256 choice
        );

        /// An incentive deposited directly against a target protocol.
        event ProtocolIncentivized(
            address indexed protocol,
            address indexed depositor,
            address token,
            uint256 amount
        );

        /// An accrued incentive claimed for a winning target.
        event IncentiveClaimed(
            address indexed protocol,
            address indexed token,
            address claimer,
            uint256 amount
        );

        /// A deposit returned to its depositor for a losing target.
        event IncentiveRefunded(
            address indexed protocol,
            address indexed token,
            address depositor,
            uint256 amount
        );

        function claim(address protocol, address token, address claimer) external;
        function refund(address protocol, address token, address depositor) external;
    }
}

sol! {
    /// The standard ERC-20 metadata surface, read via `eth_call`.
    contract Erc20 {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
    }
}

sol! {
    /// Multicall3, used both for batched metadata reads and for batched settlement submission
    /// with per-item allow-failure semantics.
    contract Multicall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct CallResult {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls) external payable returns (CallResult[] memory returnData);
    }
}

/// The canonical Multicall3 deployment address, identical on all major EVM chains.
pub const MULTICALL3_ADDRESS: alloy::primitives::Address =
    alloy::primitives::address!("cA11bde05977b3631167028862bE2a173976CA11");
