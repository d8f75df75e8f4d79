//! DEX protocol decoders for Uniswap V2/V3 and their clones.
//!
//! One decoder per protocol covers both data sources: receipt logs (swap
//! topics) and replayed internal calls (swap selectors). Token resolution
//! runs through the pool-token store first, then pool storage, then a
//! batched `token0()`/`token1()` call, and writes what it learns back into
//! the store.

use alloy::primitives::{Address, Bytes, B256, I256, U256};
use mev_data::cache::StateCache;
use mev_data::types::{LogRecord, Protocol};
use mev_data::{Result, RpcClient};

use crate::tracer::InternalCall;

/// Ethereum mainnet contract addresses (compile-time constants).
pub mod addresses {
    use alloy::primitives::Address;

    /// Uniswap V2 Factory
    pub const UNISWAP_V2_FACTORY: Address =
        alloy::primitives::address!("5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f");

    /// SushiSwap Factory (a V2 clone)
    pub const SUSHISWAP_FACTORY: Address =
        alloy::primitives::address!("C0AEe478e3658e2610c5F7A4A2E1777cE9e4f2Ac");

    /// Uniswap V3 Factory
    pub const UNISWAP_V3_FACTORY: Address =
        alloy::primitives::address!("1F98431c8aD98523631AE4a59f267346ea31F984");

    /// Wrapped Ether (WETH) on mainnet
    pub const WETH: Address =
        alloy::primitives::address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
}

/// Event signature hashes.
pub mod topics {
    use alloy::primitives::{b256, B256};

    /// `Swap(address,uint256,uint256,uint256,uint256,address)`, V2 and Sushi pools.
    pub const V2_SWAP: B256 =
        b256!("d78ad95fa46c994b6551d0da85fc275fe613ce37657fb8d5e3d130840159d822");

    /// `Swap(address,address,int256,int256,uint160,uint128,int24)`, V3 pools.
    pub const V3_SWAP: B256 =
        b256!("c42079f94a6350d7e6235f29174924f928cc2ac818eb64fed8004e115fbcca67");

    /// ERC-20 `Transfer(address,address,uint256)`.
    pub const ERC20_TRANSFER: B256 =
        b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

    /// V2 factory `PairCreated(address,address,address,uint256)`.
    pub const V2_PAIR_CREATED: B256 =
        b256!("0d3648bd0f6ba80134a33ba9275ac585d9d315f0ad8355cddefde31afa28d0e9");

    /// V3 factory `PoolCreated(address,address,uint24,int24,address)`.
    pub const V3_POOL_CREATED: B256 =
        b256!("783cca1c0412dd0d695e784568c96da2e9c22ff989357a2e8b1d9b2b4e6b7118");
}

/// Function selectors, as bytes.
pub mod selectors {
    /// V2 pool `swap(uint256,uint256,address,bytes)`.
    pub const V2_POOL_SWAP: [u8; 4] = [0x02, 0x2c, 0x0d, 0x9f];
    /// V3 pool `swap(address,bool,int256,uint160,bytes)`.
    pub const V3_POOL_SWAP: [u8; 4] = [0x12, 0x8a, 0xcb, 0x08];
    /// Router `swapExactTokensForTokens`.
    pub const SWAP_EXACT_TOKENS_FOR_TOKENS: [u8; 4] = [0x38, 0xed, 0x17, 0x39];
    /// Router `swapExactETHForTokens`.
    pub const SWAP_EXACT_ETH_FOR_TOKENS: [u8; 4] = [0x7f, 0xf3, 0x6a, 0xb5];
    /// Router `swapExactTokensForETH`.
    pub const SWAP_EXACT_TOKENS_FOR_ETH: [u8; 4] = [0x18, 0xcb, 0xaf, 0xe5];
    /// Router `swapTokensForExactTokens`.
    pub const SWAP_TOKENS_FOR_EXACT_TOKENS: [u8; 4] = [0x88, 0x03, 0xdb, 0xee];
    /// Router `swapETHForExactTokens`.
    pub const SWAP_ETH_FOR_EXACT_TOKENS: [u8; 4] = [0xfb, 0x3b, 0xdb, 0x41];
    /// Alternate V3 swap entry.
    pub const V3_SWAP_ALT: [u8; 4] = [0xc4, 0x20, 0x79, 0xf9];
    /// Router `multicall(uint256,bytes[])`.
    pub const ROUTER_MULTICALL_DEADLINE: [u8; 4] = [0x5a, 0xe4, 0x01, 0xdc];
    /// Router `multicall(bytes[])`.
    pub const ROUTER_MULTICALL: [u8; 4] = [0xac, 0x96, 0x50, 0xd8];

    /// V2 `getReserves()`, used as a code-signature probe.
    pub const GET_RESERVES: [u8; 4] = [0x09, 0x02, 0xf1, 0xac];
    /// V3 `slot0()`, used as a code-signature probe.
    pub const SLOT0: [u8; 4] = [0x38, 0x50, 0xc7, 0xbd];

    /// Selectors accepted as swap invocations. Adding one is a code-local
    /// change.
    pub const SWAP_ALLOW_LIST: [[u8; 4]; 10] = [
        V2_POOL_SWAP,
        V3_POOL_SWAP,
        SWAP_EXACT_TOKENS_FOR_TOKENS,
        SWAP_EXACT_ETH_FOR_TOKENS,
        SWAP_EXACT_TOKENS_FOR_ETH,
        SWAP_TOKENS_FOR_EXACT_TOKENS,
        SWAP_ETH_FOR_EXACT_TOKENS,
        V3_SWAP_ALT,
        ROUTER_MULTICALL_DEADLINE,
        ROUTER_MULTICALL,
    ];

    pub fn is_swap_selector(selector: [u8; 4]) -> bool {
        SWAP_ALLOW_LIST.contains(&selector)
    }
}

/// Compile-time ABI definitions for the pool entry points the decoders
/// recognize; selectors and event shapes are auditable in source.
pub mod abi {
    use alloy::sol;

    sol! {
        interface UniswapV2Pair {
            event Swap(address indexed sender, uint256 amount0In, uint256 amount1In, uint256 amount0Out, uint256 amount1Out, address indexed to);

            function swap(uint256 amount0Out, uint256 amount1Out, address to, bytes calldata data) external;
            function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
            function token0() external view returns (address);
            function token1() external view returns (address);
        }

        interface UniswapV3Pool {
            event Swap(address indexed sender, address indexed recipient, int256 amount0, int256 amount1, uint160 sqrtPriceX96, uint128 liquidity, int24 tick);

            function swap(address recipient, bool zeroForOne, int256 amountSpecified, uint160 sqrtPriceLimitX96, bytes calldata data) external returns (int256 amount0, int256 amount1);
        }
    }
}

/// Storage slots to preload before replaying into a known pool type.
pub fn critical_slots(protocol: Protocol) -> &'static [u64] {
    match protocol {
        // token0, token1, packed reserves.
        Protocol::UniswapV2 => &[6, 7, 8],
        // slot0 struct, liquidity.
        Protocol::UniswapV3 => &[0, 4],
        Protocol::Unknown => &[],
    }
}

/// Identify a pool's protocol family from byte patterns in its runtime code.
pub fn probe_protocol(code: &[u8]) -> Option<Protocol> {
    if contains_selector(code, selectors::GET_RESERVES) {
        Some(Protocol::UniswapV2)
    } else if contains_selector(code, selectors::SLOT0) {
        Some(Protocol::UniswapV3)
    } else {
        None
    }
}

fn contains_selector(code: &[u8], selector: [u8; 4]) -> bool {
    code.windows(4).any(|window| window == selector)
}

/// Swap decoded from a receipt log, before token resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct LogSwapCandidate {
    pub pool: Address,
    pub protocol: Protocol,
    pub amount_in: U256,
    pub amount_out: U256,
    /// Direction: true means token0 → token1.
    pub token_in_is_token0: bool,
    pub sender: Option<Address>,
    pub recipient: Option<Address>,
    pub log_index: u64,
}

/// Swap-selector invocation observed during replay.
#[derive(Clone, Debug, PartialEq)]
pub struct CallSwapCandidate {
    pub pool: Address,
    pub selector: [u8; 4],
    pub depth: u32,
    pub gas_used: u64,
    pub call_index: usize,
    pub amount0_out: Option<U256>,
    pub amount1_out: Option<U256>,
    pub recipient: Option<Address>,
}

/// Decode one log into a swap candidate if its topic0 is a known swap topic.
pub fn parse_swap_log(log: &LogRecord) -> Option<LogSwapCandidate> {
    let topic0 = log.topic0()?;
    if topic0 == topics::V2_SWAP {
        parse_v2_swap_log(log)
    } else if topic0 == topics::V3_SWAP {
        parse_v3_swap_log(log)
    } else {
        None
    }
}

pub fn is_swap_topic(topic0: B256) -> bool {
    topic0 == topics::V2_SWAP || topic0 == topics::V3_SWAP
}

/// V2 payload: four big-endian unsigned words. Exactly one of the
/// (in, out) pairings must be non-zero; anything else is rejected.
fn parse_v2_swap_log(log: &LogRecord) -> Option<LogSwapCandidate> {
    if log.data.len() < 128 {
        return None;
    }
    let amount0_in = word(&log.data, 0);
    let amount1_in = word(&log.data, 1);
    let amount0_out = word(&log.data, 2);
    let amount1_out = word(&log.data, 3);

    let (amount_in, amount_out, token_in_is_token0) =
        if amount0_in > U256::ZERO && amount1_out > U256::ZERO {
            (amount0_in, amount1_out, true)
        } else if amount1_in > U256::ZERO && amount0_out > U256::ZERO {
            (amount1_in, amount0_out, false)
        } else {
            return None;
        };

    Some(LogSwapCandidate {
        pool: log.address,
        protocol: Protocol::UniswapV2,
        amount_in,
        amount_out,
        token_in_is_token0,
        sender: log.topics.get(1).map(address_from_topic),
        recipient: log.topics.get(2).map(address_from_topic),
        log_index: log.index,
    })
}

/// V3 payload: signed amount0/amount1 in two's complement. The negative
/// side is what the pool pays out; same-signed amounts are rejected.
fn parse_v3_swap_log(log: &LogRecord) -> Option<LogSwapCandidate> {
    if log.data.len() < 160 {
        return None;
    }
    let amount0 = I256::from_raw(word(&log.data, 0));
    let amount1 = I256::from_raw(word(&log.data, 1));

    let (amount_in, amount_out, token_in_is_token0) = if amount0.is_positive()
        && amount1.is_negative()
    {
        (amount0.unsigned_abs(), amount1.unsigned_abs(), true)
    } else if amount1.is_positive() && amount0.is_negative() {
        (amount1.unsigned_abs(), amount0.unsigned_abs(), false)
    } else {
        return None;
    };

    Some(LogSwapCandidate {
        pool: log.address,
        protocol: Protocol::UniswapV3,
        amount_in,
        amount_out,
        token_in_is_token0,
        sender: log.topics.get(1).map(address_from_topic),
        recipient: log.topics.get(2).map(address_from_topic),
        log_index: log.index,
    })
}

/// Scan replayed internal calls for allow-listed swap selectors. Only
/// successful calls qualify. For the V2 pool `swap(…)` form the calldata
/// yields `amount0Out`, `amount1Out` and the recipient.
pub fn swap_calls(calls: &[InternalCall]) -> Vec<CallSwapCandidate> {
    let mut candidates = Vec::new();
    for (call_index, call) in calls.iter().enumerate() {
        let Some(selector) = call.selector() else {
            continue;
        };
        if !selectors::is_swap_selector(selector) || !call.success {
            continue;
        }

        let mut candidate = CallSwapCandidate {
            pool: call.to,
            selector,
            depth: call.depth,
            gas_used: call.gas_used,
            call_index,
            amount0_out: None,
            amount1_out: None,
            recipient: None,
        };
        if selector == selectors::V2_POOL_SWAP && call.input.len() >= 4 + 96 {
            let args = &call.input[4..];
            candidate.amount0_out = Some(word(args, 0));
            candidate.amount1_out = Some(word(args, 1));
            candidate.recipient = Some(address_from_word(word(args, 2)).unwrap_or(Address::ZERO));
        }
        candidates.push(candidate);
    }
    candidates
}

/// `PairCreated`/`PoolCreated` seen in a receipt: learn the pool's tokens
/// without any RPC.
pub fn factory_created_pool(log: &LogRecord) -> Option<(Address, (Address, Address))> {
    let topic0 = log.topic0()?;
    let token0 = address_from_topic(log.topics.get(1)?);
    let token1 = address_from_topic(log.topics.get(2)?);

    if topic0 == topics::V2_PAIR_CREATED {
        // data = (pair, allPairsLength)
        if log.data.len() < 32 {
            return None;
        }
        let pool = address_from_word(word(&log.data, 0))?;
        Some((pool, (token0, token1)))
    } else if topic0 == topics::V3_POOL_CREATED {
        // topics = (token0, token1, fee); data = (tickSpacing, pool)
        if log.data.len() < 64 {
            return None;
        }
        let pool = address_from_word(word(&log.data, 1))?;
        Some((pool, (token0, token1)))
    } else {
        None
    }
}

/// Resolve a pool's token pair: store, then pool storage through the cache,
/// then a batched `token0()`/`token1()` call. Learned pairs are written
/// back to the store.
pub async fn resolve_pool_tokens(
    cache: &StateCache,
    rpc: &RpcClient,
    pool: Address,
    protocol: Protocol,
) -> Result<Option<(Address, Address)>> {
    if let Some(pair) = cache.pool_tokens(pool) {
        return Ok(Some(pair));
    }

    let slots = match protocol {
        Protocol::UniswapV2 => Some((6u64, 7u64)),
        Protocol::UniswapV3 => Some((0u64, 1u64)),
        Protocol::Unknown => None,
    };
    if let Some((slot0, slot1)) = slots {
        let word0 = cache.get_storage(pool, U256::from(slot0)).await?;
        let word1 = cache.get_storage(pool, U256::from(slot1)).await?;
        if let (Some(token0), Some(token1)) = (address_from_word(word0), address_from_word(word1)) {
            cache.install_many_pool_tokens([(pool, (token0, token1))], cache.block_number())?;
            return Ok(Some((token0, token1)));
        }
    }

    let fetched = rpc
        .batch_pool_tokens(&[pool], cache.block_number())
        .await?;
    match fetched.get(&pool).copied() {
        Some(pair) => {
            cache.install_many_pool_tokens([(pool, pair)], cache.block_number())?;
            Ok(Some(pair))
        }
        None => Ok(None),
    }
}

/// V2 reserves as unpacked from slot 8.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct V2Reserves {
    pub reserve0: U256,
    pub reserve1: U256,
    pub timestamp_last: u32,
}

/// Slot 8 packs `reserve0 (u112) | reserve1 (u112) | blockTimestampLast (u32)`.
pub fn decode_reserves_word(word: U256) -> V2Reserves {
    let mask112 = (U256::from(1) << 112) - U256::from(1);
    V2Reserves {
        reserve0: word & mask112,
        reserve1: (word >> 112) & mask112,
        timestamp_last: {
            let mask32: U256 = U256::from(u32::MAX);
            let masked: U256 = (word >> 224) & mask32;
            masked.to::<u32>()
        },
    }
}

/// Read a V2 pool's reserves: packed slot 8 through the cache, falling back
/// to a `getReserves()` call when the slot is empty.
pub async fn v2_reserves(
    cache: &StateCache,
    rpc: &RpcClient,
    pool: Address,
) -> Result<Option<V2Reserves>> {
    let packed = cache.get_storage(pool, U256::from(8)).await?;
    if packed != U256::ZERO {
        return Ok(Some(decode_reserves_word(packed)));
    }

    let calldata = Bytes::from(selectors::GET_RESERVES.to_vec());
    let returned = rpc.call(pool, &calldata, cache.block_number()).await?;
    if returned.len() < 64 {
        return Ok(None);
    }
    Ok(Some(V2Reserves {
        reserve0: word(&returned, 0),
        reserve1: word(&returned, 1),
        timestamp_last: 0,
    }))
}

/// Constant-product output with the 0.3% fee:
/// `out = in·997·R_out / (R_in·1000 + in·997)`. Returns 0 on empty
/// reserves or overflow.
pub fn v2_output(amount_in: U256, reserve_in: U256, reserve_out: U256) -> U256 {
    if amount_in.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
        return U256::ZERO;
    }
    let fee = U256::from(997);
    let Some(in_with_fee) = amount_in.checked_mul(fee) else {
        return U256::ZERO;
    };
    let Some(numerator) = in_with_fee.checked_mul(reserve_out) else {
        return U256::ZERO;
    };
    let Some(scaled) = reserve_in.checked_mul(U256::from(1000)) else {
        return U256::ZERO;
    };
    let Some(denominator) = scaled.checked_add(in_with_fee) else {
        return U256::ZERO;
    };
    numerator / denominator
}

/// What-if estimator: output of trading `amount_in` of `token_in` through
/// the pool. V3 estimation is not supported and yields 0 (callers prune).
pub async fn calculate_output(
    cache: &StateCache,
    rpc: &RpcClient,
    protocol: Protocol,
    pool: Address,
    token_in: Address,
    amount_in: U256,
) -> Result<U256> {
    if protocol != Protocol::UniswapV2 {
        return Ok(U256::ZERO);
    }
    let Some((token0, token1)) = resolve_pool_tokens(cache, rpc, pool, protocol).await? else {
        return Ok(U256::ZERO);
    };
    let Some(reserves) = v2_reserves(cache, rpc, pool).await? else {
        return Ok(U256::ZERO);
    };
    let (reserve_in, reserve_out) = if token_in == token0 {
        (reserves.reserve0, reserves.reserve1)
    } else if token_in == token1 {
        (reserves.reserve1, reserves.reserve0)
    } else {
        return Ok(U256::ZERO);
    };
    Ok(v2_output(amount_in, reserve_in, reserve_out))
}

fn word(data: &[u8], index: usize) -> U256 {
    let start = index * 32;
    U256::from_be_slice(&data[start..start + 32])
}

/// Last 20 bytes of a topic word.
pub fn address_from_topic(topic: &B256) -> Address {
    Address::from_slice(&topic[12..])
}

/// A storage/calldata word is an address only when non-zero and within 160
/// bits; anything else (packed structs, prices) is rejected.
pub fn address_from_word(value: U256) -> Option<Address> {
    if value.is_zero() || value.bit_len() > 160 {
        return None;
    }
    let bytes: [u8; 32] = value.to_be_bytes();
    Some(Address::from_slice(&bytes[12..]))
}
