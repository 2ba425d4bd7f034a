//! Minimal ABI declarations for the gateway contracts.

use alloy_sol_types::sol;

sol! {
	/// Maps `sHash("<asset>/to<chain>")` to the contracts serving the asset.
	interface IGatewayRegistry {
		function getMintGatewayBySymbol(bytes32 assetHash) external view returns (address);
		function getLockGatewayBySymbol(bytes32 assetHash) external view returns (address);
		function getRenAssetBySymbol(bytes32 assetHash) external view returns (address);
		function getLockAssetBySymbol(bytes32 assetHash) external view returns (address);
	}

	interface IMintGateway {
		event LogMint(address indexed to, uint256 amount, uint256 indexed sigHash, bytes32 indexed nHash);
		event LogBurn(bytes to, uint256 amount, uint256 indexed burnNonce, bytes indexed indexedTo);
		event LogBurnToChain(
			string recipientAddress,
			string recipientChain,
			bytes recipientPayload,
			uint256 amount,
			uint256 indexed burnNonce,
			string indexed recipientAddressIndexed,
			string indexed recipientChainIndexed
		);

		function status(bytes32 sigHash) external view returns (bool);
	}

	interface ILockGateway {
		event LogRelease(address indexed recipient, uint256 amount, bytes32 indexed sigHash, bytes32 indexed nHash);
		event LogLockToChain(
			string recipientAddress,
			string recipientChain,
			bytes recipientPayload,
			uint256 amount,
			uint256 indexed lockNonce,
			string indexed recipientAddressIndexed,
			string indexed recipientChainIndexed
		);

		function status(bytes32 sigHash) external view returns (bool);
	}

	interface ITransferWithLog {
		event LogTransferred(address indexed from, address indexed to, uint256 amount);
	}

	interface IERC20Metadata {
		function decimals() external view returns (uint256);
		function balanceOf(address owner) external view returns (uint256);
	}
}
