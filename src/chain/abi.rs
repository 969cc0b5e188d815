//! Solidity interfaces for on-chain interactions.
//!
//! - [`IStablecoin`]: ERC-20 subset of the mock USDC token
//! - [`IAmiPay`]: sponsor allowance bookkeeping of the settlement contract

use alloy_sol_types::sol;

sol! {
    /// ERC-20 subset used for balances, approvals and direct payments.
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IStablecoin {
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function approve(address spender, uint256 amount) external returns (bool);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

sol! {
    /// AmiPay settlement contract.
    ///
    /// `allowances` is the public mapping `allowances[beneficiary][sponsor]`.
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IAmiPay {
        function depositAllowance(address beneficiary, uint256 amount) external;
        function spendFrom(address sponsor, address recipient, uint256 amount) external;
        function allowances(address beneficiary, address sponsor) external view returns (uint256);

        event AllowanceDeposited(address indexed sponsor, address indexed beneficiary, uint256 amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use alloy_sol_types::{SolCall, SolEvent};

    #[test]
    fn selectors_match_the_deployed_abi() {
        assert_eq!(IStablecoin::balanceOfCall::SELECTOR, [0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(IStablecoin::transferCall::SELECTOR, [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(IStablecoin::approveCall::SELECTOR, [0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(IStablecoin::decimalsCall::SELECTOR, [0x31, 0x3c, 0xe5, 0x67]);
    }

    #[test]
    fn spend_from_encodes_three_words() {
        let call = IAmiPay::spendFromCall {
            sponsor: Address::repeat_byte(1),
            recipient: Address::repeat_byte(2),
            amount: U256::from(8u64),
        };
        assert_eq!(call.abi_encode().len(), 4 + 32 * 3);
        assert_eq!(
            IAmiPay::AllowanceDeposited::SIGNATURE,
            "AllowanceDeposited(address,address,uint256)"
        );
    }
}
