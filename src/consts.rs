pub const DEFAULT_SOLIDITY_COMPILER_LIST: &str =
    "https://solc-bin.ethereum.org/linux-amd64/list.json";
