//! ABI bindings for the contracts this tool deploys and drives.

use alloy_core::sol;

/// Name under which `FundMe` is recorded in the deployment registry.
pub const FUND_ME: &str = "FundMe";
/// Name under which the mock price feed is recorded in the deployment registry.
pub const MOCK_V3_AGGREGATOR: &str = "MockV3Aggregator";

/// Decimals of the mock ETH/USD feed.
pub const MOCK_DECIMALS: u8 = 8;
/// Initial answer of the mock ETH/USD feed: 2000 USD with 8 decimals.
pub const MOCK_INITIAL_ANSWER: i64 = 2_000_00000000;

sol! {
    /// The funding contract.
    #[derive(Debug, PartialEq, Eq)]
    interface IFundMe {
        function fund() external payable;
        function withdraw() external;
        function cheaperWithdraw() external;

        function s_priceFeed() external view returns (address);
        function s_funders(uint256 index) external view returns (address);
        function s_addressToAmount(address funder) external view returns (uint256);
        function i_owner() external view returns (address);
        function MINIMUM_USD() external view returns (uint256);
    }

    /// Chainlink-style aggregator, mocked on development networks.
    #[derive(Debug, PartialEq, Eq)]
    interface IAggregatorV3 {
        function decimals() external view returns (uint8);
        function latestRoundData()
            external
            view
            returns (
                uint80 roundId,
                int256 answer,
                uint256 startedAt,
                uint256 updatedAt,
                uint80 answeredInRound
            );
    }
}
