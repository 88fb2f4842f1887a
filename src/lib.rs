pub mod amounts;
pub mod config;
pub mod deployment;
pub mod eligibility;
pub mod error;
pub mod orchestrator;
pub mod port;
pub mod provider;
pub mod snapshot;
pub mod store;

pub mod test_helpers;

pub use error::{
    LotteryError,
    Result,
};

pub mod lottery_types {
    use alloy_sol_types::sol;

    sol! {
        interface ILottery {
            function ticketPrice() external view returns (uint256);
            function pricePool() external view returns (uint256);
            function managers(uint256 index) external view returns (address);
            function owner() external view returns (address);
            function lastDrawTime() external view returns (uint256);
            function enter(uint256 ticketCount) external;
            function setManager(bool isFirstSlot, address manager) external;
            function setTicketPrice(uint256 amount) external;
            function draw() external;
        }
    }
}

pub mod token_types {
    use alloy_sol_types::sol;

    sol! {
        interface IERC20 {
            function balanceOf(address account) external view returns (uint256);
            function allowance(address owner, address spender) external view returns (uint256);
            function approve(address spender, uint256 amount) external returns (bool);
        }
    }
}
