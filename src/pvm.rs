//! Owned PVM machine: register file, RAM, code, and (optionally) an accumulation
//! context, driven through the fetch-decode-execute loop (Ψ). One `Pvm` per
//! invocation; nothing here reaches for process-wide state (mirrors the shape
//! of wasm-wrapper.ts's PVMWasmWrapper, minus the singleton).

use std::collections::HashMap;

use crate::codec::{
    decode_accumulate_args, decode_blob, decode_implications_pair, decode_program_from_preimage,
    encode_implications_pair, AccountEntry, CompleteServiceAccount, DeferredTransfer,
    Implications, ImplicationsPair, PartialState, ProvisionEntry,
};
use crate::config::{
    FetchSystemConstantsConfig, ARGS_SEGMENT_START, DEFAULT_GAS_LIMIT, HALT_ADDRESS,
    INIT_INPUT_SIZE, REG_WHAT, RESULT_CODE_FAULT, RESULT_CODE_HALT, RESULT_CODE_HOST,
    RESULT_CODE_OOG, RESULT_CODE_PANIC, STACK_SEGMENT_END, ZONE_SIZE,
};
use crate::host_functions::base::HostFunctionContext;
use crate::host_functions::get_host_function;
use crate::instructions::registry::InstructionRegistry;
use crate::instructions::registry_instructions::register_all_instructions;
use crate::mock_ram::MockRam;
use crate::parser::PvmParser;
use crate::ram::PvmRam;
use crate::simple_ram::SimpleRam;
use crate::types::{InstructionContext, InstructionResult, MemoryAccessType, Ram, RegisterState};
use crate::PvmError;

/// Gas charged for every host call before the handler itself runs (Gray Paper ECALLI base cost).
const HOST_BASE_GAS: u32 = 10;

/// Execution status (mirrors the `Status` enum of wasm-wrapper.ts).
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok = 0,
    Halt = 1,
    Panic = 2,
    Fault = 3,
    Host = 4,
    Oog = 5,
}

/// Which RAM backend a `Pvm` owns. `Mock` exists only to satisfy the `init(ramKind)`
/// contract's three-way enum; it performs no real paging (see `mock_ram`).
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RamKind {
    Paged = 0,
    Simple = 1,
    Mock = 2,
}

/// RAM backend: one of the three implementations, dispatched by value rather than `dyn`
/// so a `Pvm` can be constructed without boxing its memory.
pub enum RamBackend {
    Paged(PvmRam),
    Simple(SimpleRam),
    Mock(MockRam),
}

impl Ram for RamBackend {
    fn read_octets(&mut self, address: u32, count: u32) -> crate::types::ReadResult {
        match self {
            Self::Paged(r) => r.read_octets(address, count),
            Self::Simple(r) => r.read_octets(address, count),
            Self::Mock(r) => r.read_octets(address, count),
        }
    }
    fn write_octets(&mut self, address: u32, values: &[u8]) -> crate::types::WriteResult {
        match self {
            Self::Paged(r) => r.write_octets(address, values),
            Self::Simple(r) => r.write_octets(address, values),
            Self::Mock(r) => r.write_octets(address, values),
        }
    }
    fn current_heap_pointer(&self) -> u32 {
        match self {
            Self::Paged(r) => r.current_heap_pointer(),
            Self::Simple(r) => r.current_heap_pointer(),
            Self::Mock(r) => r.current_heap_pointer(),
        }
    }
    fn set_current_heap_pointer(&mut self, value: u32) {
        match self {
            Self::Paged(r) => r.set_current_heap_pointer(value),
            Self::Simple(r) => r.set_current_heap_pointer(value),
            Self::Mock(r) => r.set_current_heap_pointer(value),
        }
    }
    fn allocate_pages(&mut self, start_page: u32, count: u32) {
        match self {
            Self::Paged(r) => r.allocate_pages(start_page, count),
            Self::Simple(r) => r.allocate_pages(start_page, count),
            Self::Mock(r) => r.allocate_pages(start_page, count),
        }
    }
    fn is_readable_with_fault(&self, address: u32, size: u32) -> crate::types::FaultCheckResult {
        match self {
            Self::Paged(r) => r.is_readable_with_fault(address, size),
            Self::Simple(r) => r.is_readable_with_fault(address, size),
            Self::Mock(r) => r.is_readable_with_fault(address, size),
        }
    }
    fn initialize_memory_layout(
        &mut self,
        argument_data: &[u8],
        read_only_data: &[u8],
        read_write_data: &[u8],
        stack_size: u32,
        heap_zero_padding_size: u32,
    ) {
        match self {
            Self::Paged(r) => r.initialize_memory_layout(
                argument_data,
                read_only_data,
                read_write_data,
                stack_size,
                heap_zero_padding_size,
            ),
            Self::Simple(r) => r.initialize_memory_layout(
                argument_data,
                read_only_data,
                read_write_data,
                stack_size,
                heap_zero_padding_size,
            ),
            Self::Mock(r) => r.initialize_memory_layout(
                argument_data,
                read_only_data,
                read_write_data,
                stack_size,
                heap_zero_padding_size,
            ),
        }
    }
    fn is_writable_with_fault(&self, address: u32, size: u32) -> crate::types::FaultCheckResult {
        match self {
            Self::Paged(r) => r.is_writable_with_fault(address, size),
            Self::Simple(r) => r.is_writable_with_fault(address, size),
            Self::Mock(r) => r.is_writable_with_fault(address, size),
        }
    }
    fn set_page_access_rights(&mut self, address: u32, length: u32, access_type: MemoryAccessType) {
        match self {
            Self::Paged(r) => r.set_page_access_rights(address, length, access_type),
            Self::Simple(r) => r.set_page_access_rights(address, length, access_type),
            Self::Mock(r) => r.set_page_access_rights(address, length, access_type),
        }
    }
    fn init_page(&mut self, address: u32, length: u32, access_type: MemoryAccessType) {
        match self {
            Self::Paged(r) => r.init_page(address, length, access_type),
            Self::Simple(r) => r.init_page(address, length, access_type),
            Self::Mock(r) => r.init_page(address, length, access_type),
        }
    }
    fn write_octets_during_initialization(&mut self, address: u32, values: &[u8]) {
        match self {
            Self::Paged(r) => r.write_octets_during_initialization(address, values),
            Self::Simple(r) => r.write_octets_during_initialization(address, values),
            Self::Mock(r) => r.write_octets_during_initialization(address, values),
        }
    }
    fn get_page_dump(&self, page_index: u32) -> Vec<u8> {
        match self {
            Self::Paged(r) => r.get_page_dump(page_index),
            Self::Simple(r) => r.get_page_dump(page_index),
            Self::Mock(r) => r.get_page_dump(page_index),
        }
    }
    fn reset(&mut self) {
        match self {
            Self::Paged(r) => r.reset(),
            Self::Simple(r) => r.reset(),
            Self::Mock(r) => r.reset(),
        }
    }
    fn last_load_address(&self) -> u32 {
        match self {
            Self::Paged(r) => r.last_load_address(),
            Self::Simple(r) => r.last_load_address(),
            Self::Mock(r) => r.last_load_address(),
        }
    }
    fn last_load_value(&self) -> u64 {
        match self {
            Self::Paged(r) => r.last_load_value(),
            Self::Simple(r) => r.last_load_value(),
            Self::Mock(r) => r.last_load_value(),
        }
    }
    fn last_store_address(&self) -> u32 {
        match self {
            Self::Paged(r) => r.last_store_address(),
            Self::Simple(r) => r.last_store_address(),
            Self::Mock(r) => r.last_store_address(),
        }
    }
    fn last_store_value(&self) -> u64 {
        match self {
            Self::Paged(r) => r.last_store_value(),
            Self::Simple(r) => r.last_store_value(),
            Self::Mock(r) => r.last_store_value(),
        }
    }
    fn clear_last_memory_op(&mut self) {
        match self {
            Self::Paged(r) => r.clear_last_memory_op(),
            Self::Simple(r) => r.clear_last_memory_op(),
            Self::Mock(r) => r.clear_last_memory_op(),
        }
    }
}

/// One decoded instruction: opcode, its operand bytes, Fskip distance, and code offset.
#[derive(Clone, Debug)]
pub struct PvmInstruction {
    pub opcode: i32,
    pub operands: Vec<u8>,
    pub fskip: i32,
    pub pc: u32,
}

impl PvmInstruction {
    #[must_use]
    pub fn new(opcode: i32, operands: Vec<u8>, fskip: i32, pc: u32) -> Self {
        Self {
            opcode,
            operands,
            fskip,
            pc,
        }
    }
}

fn instruction_registry() -> &'static InstructionRegistry {
    use std::sync::OnceLock;
    static REGISTRY: OnceLock<InstructionRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut r = InstructionRegistry::new();
        register_all_instructions(&mut r);
        r
    })
}

/// Accumulation-context fields carried alongside the bare register/RAM/code state of a `Pvm`.
/// Populated only by [`Pvm::setup_accumulate`]; absent for a plain `run`/`step` invocation.
#[derive(Default)]
struct AccumulationContext {
    yield_hash: Option<Vec<u8>>,
    checkpoint_requested: bool,
    accumulate_inputs_encoded: Vec<Vec<u8>>,
    work_package_encoded: Option<Vec<u8>>,
    auth_config: Option<Vec<u8>>,
    auth_token: Option<Vec<u8>>,
    refine_context_encoded: Option<Vec<u8>>,
    work_item_summaries: Option<Vec<Vec<u8>>>,
    work_item_payloads: Option<Vec<Vec<u8>>>,
    entropy_accumulator: Option<Vec<u8>>,
    num_cores: u32,
    num_validators: u32,
    auth_queue_size: u32,
    timeslot: Option<u64>,
    fetch_config: Option<FetchSystemConstantsConfig>,
    service_id: Option<u64>,
    accounts: Option<HashMap<u64, CompleteServiceAccount>>,
    implications_regular: Option<Implications>,
    implications_exceptional: Option<Implications>,
    pending_xfers: Vec<DeferredTransfer>,
    regular_state: PartialState,
    nextfreeid: u32,
    provisions: Vec<ProvisionEntry>,
}

/// Configuration the caller supplies up front for an accumulation invocation: protocol
/// parameters the FETCH host function reports via selector 0, plus the counts that size
/// BLESS/ASSIGN/DESIGNATE's fixed-width arrays. Grouped into one value (§10.3) instead of
/// a long positional parameter list.
#[derive(Clone, Debug, Default)]
pub struct AccumulateSetup {
    pub gas_limit: u32,
    pub num_cores: u32,
    pub num_validators: u32,
    pub auth_queue_size: u32,
    pub entropy_accumulator: Vec<u8>,
    pub encoded_accumulate_inputs: Vec<Vec<u8>>,
    pub fetch_config: FetchSystemConstantsConfig,
}

/// The PVM machine: register file, RAM, decoded code, and (when driving accumulation)
/// the mutable `ImplicationsPair` context. Every field here is owned; a caller embedding
/// several independent invocations constructs one `Pvm` per invocation.
pub struct Pvm {
    pub ram_kind: RamKind,
    pub program_counter: u32,
    pub gas_left: u32,
    pub status: Status,
    pub exit_arg: u32,
    pub result_code: u8,
    pub registers: RegisterState,
    pub code: Vec<u8>,
    pub bitmask: Vec<u8>,
    pub jump_table: Vec<u32>,
    pub ram: RamBackend,
    pub last_load_address: u32,
    pub last_load_value: u64,
    pub last_store_address: u32,
    pub last_store_value: u64,
    pub last_opcode: u8,
    pub host_call_id: u32,
    pub log_messages: Vec<String>,
    has_accumulation_context: bool,
    accumulation: AccumulationContext,
}

impl Pvm {
    /// Construct a fresh machine with the given RAM backend and default (empty) program state.
    #[must_use]
    pub fn new(ram_kind: RamKind) -> Self {
        let ram = match ram_kind {
            RamKind::Simple => RamBackend::Simple(SimpleRam::new()),
            RamKind::Mock => RamBackend::Mock(MockRam::new()),
            RamKind::Paged => RamBackend::Paged(PvmRam::new()),
        };
        Self {
            ram_kind,
            program_counter: 0,
            gas_left: DEFAULT_GAS_LIMIT,
            status: Status::Panic,
            exit_arg: 0,
            result_code: RESULT_CODE_PANIC,
            registers: [0u64; 13],
            code: vec![],
            bitmask: vec![],
            jump_table: vec![],
            ram,
            last_load_address: 0,
            last_load_value: 0,
            last_store_address: 0,
            last_store_value: 0,
            last_opcode: 0,
            host_call_id: 0,
            log_messages: vec![],
            has_accumulation_context: false,
            accumulation: AccumulationContext::default(),
        }
    }

    /// Drop all per-invocation state: register file, memory pages, code, and accumulation
    /// context. Gas is restored to the default limit. The RAM backend itself is kept.
    pub fn reset(&mut self) {
        self.program_counter = 0;
        self.gas_left = DEFAULT_GAS_LIMIT;
        self.status = Status::Ok;
        self.exit_arg = 0;
        self.result_code = RESULT_CODE_HALT;
        self.registers = [0u64; 13];
        self.ram.reset();
        self.last_opcode = 0;
        self.host_call_id = 0;
        self.log_messages.clear();
        self.has_accumulation_context = false;
        self.accumulation = AccumulationContext::default();
    }

    #[must_use]
    pub fn has_accumulation_context(&self) -> bool {
        self.has_accumulation_context
    }

    #[must_use]
    pub fn yield_hash(&self) -> Option<&[u8]> {
        self.accumulation.yield_hash.as_deref()
    }

    pub fn set_accumulate_inputs(&mut self, inputs: Vec<Vec<u8>>) {
        self.accumulation.accumulate_inputs_encoded = inputs;
    }

    pub fn set_fetch_work_package(&mut self, encoded: Option<Vec<u8>>) {
        self.accumulation.work_package_encoded = encoded;
    }

    pub fn set_fetch_auth_config(&mut self, data: Option<Vec<u8>>) {
        self.accumulation.auth_config = data;
    }

    pub fn set_fetch_auth_token(&mut self, data: Option<Vec<u8>>) {
        self.accumulation.auth_token = data;
    }

    pub fn set_fetch_refine_context(&mut self, encoded: Option<Vec<u8>>) {
        self.accumulation.refine_context_encoded = encoded;
    }

    pub fn set_fetch_work_item_summaries(&mut self, summaries: Option<Vec<Vec<u8>>>) {
        self.accumulation.work_item_summaries = summaries;
    }

    pub fn set_fetch_work_item_payloads(&mut self, payloads: Option<Vec<Vec<u8>>>) {
        self.accumulation.work_item_payloads = payloads;
    }

    /// Drain and return LOG (function id 100) messages accumulated since the last drain.
    pub fn take_log_messages(&mut self) -> Vec<String> {
        std::mem::take(&mut self.log_messages)
    }

    /// Bounds-checked single-register read (§3: indices ≥ 13 are invalid).
    pub fn get_register(&self, index: u8) -> Result<u64, PvmError> {
        self.registers
            .get(index as usize)
            .copied()
            .ok_or(PvmError::RegisterIndexOutOfRange(index))
    }

    /// Bounds-checked single-register write.
    pub fn set_register(&mut self, index: u8, value: u64) -> Result<(), PvmError> {
        let slot = self
            .registers
            .get_mut(index as usize)
            .ok_or(PvmError::RegisterIndexOutOfRange(index))?;
        *slot = value;
        Ok(())
    }

    /// Serialize the register file as 104 bytes (13 × 8, little-endian).
    #[must_use]
    pub fn get_registers(&self) -> [u8; 104] {
        let mut out = [0u8; 104];
        for (i, &r) in self.registers.iter().enumerate() {
            out[i * 8..i * 8 + 8].copy_from_slice(&r.to_le_bytes());
        }
        out
    }

    /// Load the register file from a little-endian buffer (13 × 8 bytes; excess or short input
    /// is truncated to whole 8-byte slots, matching the teacher's buffer-based setter).
    pub fn set_registers(&mut self, data: &[u8]) {
        for (i, chunk) in data.chunks_exact(8).take(13).enumerate() {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            self.registers[i] = u64::from_le_bytes(bytes);
        }
    }

    /// Gray Paper equation 831: when halted, the result is `read(ω₇, ω₈)`; empty when ω₈ = 0.
    #[must_use]
    pub fn result(&mut self) -> Vec<u8> {
        let offset = self.registers[7] as u32;
        let length = self.registers[8] as u32;
        if length == 0 {
            return Vec::new();
        }
        let read = self.ram.read_octets(offset, length);
        match read.data {
            Some(data) if read.fault_address == 0 => data,
            _ => Vec::new(),
        }
    }

    /// Load a raw deblob (code + packed bitmask + jump table), reset program state, and run
    /// it to completion. Errors (malformed blob) leave the machine in the PANIC state.
    pub fn run_blob(&mut self, program: &[u8]) {
        self.load_blob(program);
        if self.status != Status::Panic || self.result_code != RESULT_CODE_PANIC {
            while self.step() {}
        }
    }

    /// Load a raw deblob and reset program state without running it.
    pub fn prepare_blob(&mut self, program: &[u8]) {
        self.load_blob(program);
    }

    fn load_blob(&mut self, program: &[u8]) {
        let parser = PvmParser::new();
        let parsed = parser.parse_program(program);
        if !parsed.success {
            self.status = Status::Panic;
            self.result_code = RESULT_CODE_PANIC;
            return;
        }
        self.code = parsed.extended_code;
        self.bitmask = parsed.bitmask;
        self.jump_table = parsed.jump_table;
        self.reset_program_state_keep_code();
    }

    /// Like `reset()` but preserves `code`/`bitmask`/`jump_table` (used after loading a blob).
    fn reset_program_state_keep_code(&mut self) {
        self.program_counter = 0;
        self.gas_left = DEFAULT_GAS_LIMIT;
        self.status = Status::Ok;
        self.exit_arg = 0;
        self.result_code = RESULT_CODE_HALT;
        self.registers = [0u64; 13];
        self.ram.reset();
        self.last_opcode = 0;
        self.host_call_id = 0;
        self.log_messages.clear();
        self.has_accumulation_context = false;
        self.accumulation = AccumulationContext::default();
    }

    pub fn init_page(&mut self, address: u32, length: u32, access: MemoryAccessType) {
        self.ram.init_page(address, length, access);
    }

    pub fn init_memory_layout(
        &mut self,
        argument_data: &[u8],
        read_only_data: &[u8],
        read_write_data: &[u8],
        stack_size: u32,
        heap_zero_padding_size: u32,
    ) {
        self.ram.initialize_memory_layout(
            argument_data,
            read_only_data,
            read_write_data,
            stack_size,
            heap_zero_padding_size,
        );
    }

    pub fn set_memory(&mut self, address: u32, data: &[u8]) {
        self.ram.write_octets_during_initialization(address, data);
    }

    /// Run to completion (`runProgram`). Returns `(gas_consumed, result_code)`.
    pub fn run_program(&mut self) -> (u32, u8) {
        while self.step() {}
        (DEFAULT_GAS_LIMIT.saturating_sub(self.gas_left), self.result_code)
    }

    /// Program loader (Y): decode a preimage-wrapped accumulate program, populate RAM and
    /// registers, decode the `ImplicationsPair` context, and set PC = 5 per §4.F.
    #[tracing::instrument(skip_all, fields(gas_limit = setup.gas_limit))]
    pub fn setup_accumulate(
        &mut self,
        program: &[u8],
        args: &[u8],
        encoded_context: &[u8],
        setup: &AccumulateSetup,
    ) -> Result<(), PvmError> {
        let decoded =
            decode_program_from_preimage(program).ok_or(PvmError::MalformedProgramPreimage)?;
        let decoded_blob = decode_blob(&decoded.code).ok_or(PvmError::MalformedProgramPreimage)?;

        // Gray Paper eq.-767: 5·Z + rnq(|o|) + rnq(|w|+z·4096) + rnq(s) + I <= 2^32.
        let rnq = |x: u64| -> u64 {
            let z = u64::from(ZONE_SIZE);
            z * ((x + z - 1) / z)
        };
        let region_layout_size = 5 * u64::from(ZONE_SIZE)
            + rnq(decoded.ro_data.len() as u64)
            + rnq(decoded.rw_data.len() as u64 + u64::from(decoded.heap_zero_padding_size) * 4096)
            + rnq(u64::from(decoded.stack_size))
            + u64::from(INIT_INPUT_SIZE);
        if region_layout_size > (1u64 << 32) {
            return Err(PvmError::RegionLayoutOverflow);
        }

        let code_len = decoded_blob.code.len();
        let ext_len = code_len + 16;
        let mut extended_code = vec![0u8; ext_len];
        extended_code[..code_len].copy_from_slice(&decoded_blob.code);
        let mut extended_bitmask = vec![1u8; ext_len + 25];
        let copy_len = decoded_blob.bitmask.len().min(ext_len);
        extended_bitmask[..copy_len].copy_from_slice(&decoded_blob.bitmask[..copy_len]);

        self.code = extended_code;
        self.bitmask = extended_bitmask;
        self.jump_table = decoded_blob.jump_table;
        self.ram.reset();
        self.ram.initialize_memory_layout(
            args,
            &decoded.ro_data,
            &decoded.rw_data,
            decoded.stack_size,
            decoded.heap_zero_padding_size,
        );

        self.program_counter = 5;
        self.gas_left = setup.gas_limit;
        self.status = Status::Ok;
        self.result_code = RESULT_CODE_HALT;
        self.registers = [0u64; 13];
        self.registers[0] = u64::from(HALT_ADDRESS);
        self.registers[1] = u64::from(STACK_SEGMENT_END);
        self.registers[7] = u64::from(ARGS_SEGMENT_START);
        self.registers[8] = args.len() as u64;
        self.exit_arg = 0;
        self.host_call_id = 0;
        self.has_accumulation_context = true;

        let accumulation = &mut self.accumulation;
        accumulation.entropy_accumulator = if setup.entropy_accumulator.len() == 32 {
            Some(setup.entropy_accumulator.clone())
        } else {
            None
        };
        accumulation.num_cores = setup.num_cores;
        accumulation.num_validators = setup.num_validators;
        accumulation.auth_queue_size = setup.auth_queue_size;
        accumulation.timeslot = decode_accumulate_args(args).map(|r| r.value.timeslot);
        accumulation.fetch_config = Some(setup.fetch_config.clone());
        accumulation.accumulate_inputs_encoded = setup.encoded_accumulate_inputs.clone();

        let num_cores_i = setup.num_cores as i32;
        let num_validators_i = setup.num_validators as i32;
        let auth_queue_size_i = setup.auth_queue_size as i32;
        let pair_result =
            decode_implications_pair(encoded_context, num_cores_i, num_validators_i, auth_queue_size_i)
                .ok_or(PvmError::MalformedAccumulationContext)?;
        let pair = pair_result.value;
        tracing::debug!(accounts = pair.regular.state.accounts.len(), "decoded accumulation context");

        accumulation.implications_regular = Some(pair.regular.clone());
        accumulation.implications_exceptional = Some(pair.exceptional);
        let regular = &pair.regular;
        accumulation.service_id = Some(regular.id as u64);
        let mut accounts = HashMap::new();
        for entry in &regular.state.accounts {
            accounts
                .entry(entry.service_id as u64)
                .or_insert_with(|| entry.account.clone());
        }
        accumulation.accounts = Some(accounts);
        accumulation.pending_xfers.clear();
        accumulation.regular_state = regular.state.clone();
        accumulation.nextfreeid = regular.nextfreeid;
        accumulation.provisions = regular.provisions.clone();

        Ok(())
    }

    /// Build the current regular implications from live state (accounts, bless/assign/designate
    /// mutations, pending transfers, provisions, yield). Used both for CHECKPOINT's imY' = imX
    /// snapshot and for encoding the final output context.
    fn build_current_regular_implications(&self) -> Option<Implications> {
        let mut regular = self.accumulation.implications_regular.clone()?;
        let mut accounts_vec: Vec<AccountEntry> = self
            .accumulation
            .accounts
            .as_ref()?
            .iter()
            .map(|(id, acc)| AccountEntry {
                service_id: *id as u32,
                account: acc.clone(),
            })
            .collect();
        accounts_vec.sort_by_key(|e| e.service_id);

        regular.nextfreeid = self.accumulation.nextfreeid;
        regular.state = self.accumulation.regular_state.clone();
        regular.state.accounts = accounts_vec;
        regular.xfers.extend(self.accumulation.pending_xfers.clone());
        regular.provisions = self.accumulation.provisions.clone();
        regular.yield_hash = self.accumulation.yield_hash.clone();
        Some(regular)
    }

    /// Encode the (possibly mutated) `ImplicationsPair` for return to the caller. `None` when
    /// no accumulation context is active.
    #[must_use]
    pub fn encode_accumulation_context(
        &self,
        num_cores: i32,
        num_validators: i32,
        auth_queue_size: i32,
    ) -> Option<Vec<u8>> {
        if !self.has_accumulation_context {
            return None;
        }
        let mut regular = self.build_current_regular_implications()?;
        let exceptional = self.accumulation.implications_exceptional.clone()?;
        regular.yield_hash = self.accumulation.yield_hash.clone();
        let pair = ImplicationsPair { regular, exceptional };
        Some(encode_implications_pair(&pair, num_cores, num_validators, auth_queue_size))
    }

    /// Run the accumulation driver end-to-end (§4.F): `setup_accumulate` followed by running
    /// to completion, returning `(gas_consumed, result_code, encoded_context)`.
    #[tracing::instrument(skip_all)]
    pub fn accumulate_invocation(
        &mut self,
        program: &[u8],
        args: &[u8],
        encoded_context: &[u8],
        setup: &AccumulateSetup,
    ) -> Result<(u32, u8, Vec<u8>), PvmError> {
        self.setup_accumulate(program, args, encoded_context, setup)?;
        let initial_gas = setup.gas_limit;
        while self.step() {}
        let gas_consumed = initial_gas.saturating_sub(self.gas_left.max(0));
        let encoded = self
            .encode_accumulation_context(
                setup.num_cores as i32,
                setup.num_validators as i32,
                setup.auth_queue_size as i32,
            )
            .unwrap_or_default();
        tracing::info!(gas_consumed, result_code = self.result_code, "accumulate invocation finished");
        Ok((gas_consumed, self.result_code, encoded))
    }

    /// One Ψ step: fetch the instruction at `program_counter`, dispatch it, and advance (or
    /// terminate). Returns `true` if the caller should step again.
    #[tracing::instrument(level = "trace", skip(self), fields(pc = self.program_counter))]
    pub fn step(&mut self) -> bool {
        self.host_call_id = 0;
        if self.code.is_empty() {
            self.status = Status::Halt;
            return false;
        }
        let pc = self.program_counter;
        if pc as usize >= self.code.len() {
            self.status = Status::Halt;
            self.result_code = RESULT_CODE_HALT;
            return false;
        }
        if self.gas_left == 0 {
            self.status = Status::Oog;
            self.result_code = RESULT_CODE_OOG;
            return false;
        }

        let parser = PvmParser::new();
        let fskip = parser.skip(pc as i32, &self.bitmask);
        let instruction_length = 1 + fskip;
        let opcode = self.code[pc as usize] as i32;
        let operands_end = (pc as usize + instruction_length as usize).min(self.code.len());
        let operands = &self.code[(pc as usize + 1)..operands_end];

        let registry = instruction_registry();
        let Some(handler) = registry.get_handler(opcode) else {
            self.status = Status::Panic;
            self.result_code = RESULT_CODE_PANIC;
            return false;
        };

        self.last_opcode = opcode as u8;
        self.gas_left = self.gas_left.saturating_sub(1);

        let pc_before = self.program_counter;
        let mut host_call_id_out = self.host_call_id;
        let mut context = InstructionContext {
            code: &self.code,
            bitmask: &self.bitmask,
            registers: &mut self.registers,
            program_counter: self.program_counter,
            gas_remaining: self.gas_left,
            operands,
            fskip,
            jump_table: &self.jump_table,
            ram: &mut self.ram,
            host_call_id_out: Some(&mut host_call_id_out),
        };
        let result = handler.execute(&mut context);
        let last_load_address = context.ram.last_load_address();
        let last_load_value = context.ram.last_load_value();
        let last_store_address = context.ram.last_store_address();
        let last_store_value = context.ram.last_store_value();
        let program_counter_after = context.program_counter;
        drop(context);
        self.host_call_id = host_call_id_out;
        self.last_load_address = last_load_address;
        self.last_load_value = last_load_value;
        self.last_store_address = last_store_address;
        self.last_store_value = last_store_value;

        if result.result_code == RESULT_CODE_HOST as i32 {
            return self.dispatch_host_trap(pc, instruction_length);
        }

        if result.result_code != InstructionResult::CONTINUE {
            self.status = match result.result_code as u8 {
                x if x == RESULT_CODE_HALT => Status::Halt,
                x if x == RESULT_CODE_PANIC => Status::Panic,
                x if x == RESULT_CODE_FAULT => Status::Fault,
                x if x == RESULT_CODE_HOST => Status::Host,
                x if x == RESULT_CODE_OOG => Status::Oog,
                _ => Status::Panic,
            };
            self.result_code = result.result_code as u8;
            self.exit_arg = if result.has_fault_address {
                result.fault_address
            } else {
                0
            };
            return false;
        }

        if program_counter_after != pc_before {
            self.program_counter = program_counter_after;
        } else {
            self.program_counter = pc + instruction_length as u32;
        }
        true
    }

    /// Step up to `n` times; stops early (returning `false`) the moment a step halts
    /// execution, matching the teacher's eager-stop loop.
    pub fn n_steps(&mut self, n: u32) -> bool {
        for _ in 0..n {
            if !self.step() {
                return false;
            }
        }
        true
    }

    /// ECALLI landed (§4.F): resolve `host_call_id`, apply the accumulation allow-list,
    /// charge the base host-call gas, and dispatch to the general/accumulate tables.
    fn dispatch_host_trap(&mut self, pc: u32, instruction_length: i32) -> bool {
        if self.has_accumulation_context {
            let id = u64::from(self.host_call_id);
            let allowed = id <= 5 || id == 100 || (14..=26).contains(&id);
            if !allowed {
                if self.gas_left < HOST_BASE_GAS {
                    self.status = Status::Oog;
                    self.result_code = RESULT_CODE_OOG;
                    return false;
                }
                self.gas_left -= HOST_BASE_GAS;
                self.registers[7] = REG_WHAT;
                self.program_counter = pc + instruction_length as u32;
                return true;
            }
        }

        let Some(handler) = get_host_function(self.host_call_id) else {
            self.registers[7] = REG_WHAT;
            self.program_counter = pc + instruction_length as u32;
            return true;
        };

        tracing::debug!(host_call_id = self.host_call_id, name = handler.name(), "host call dispatch");

        if self.gas_left < HOST_BASE_GAS {
            self.status = Status::Oog;
            self.result_code = RESULT_CODE_OOG;
            return false;
        }
        self.gas_left -= HOST_BASE_GAS;

        let has_ctx = self.has_accumulation_context;
        let accumulation = &mut self.accumulation;
        let mut host_ctx = HostFunctionContext {
            registers: &mut self.registers,
            ram: &mut self.ram,
            gas_remaining: &mut self.gas_left,
            service_id: accumulation.service_id,
            service_account: None,
            accounts: accumulation.accounts.as_mut(),
            manager_id: has_ctx.then_some(u64::from(accumulation.regular_state.manager)),
            registrar_id: has_ctx.then_some(u64::from(accumulation.regular_state.registrar)),
            nextfreeid: has_ctx.then_some(&mut accumulation.nextfreeid),
            lookup_timeslot: None,
            timeslot: accumulation.timeslot,
            expunge_period: accumulation
                .fetch_config
                .as_ref()
                .map(|c| u64::from(c.preimage_expunge_period)),
            refine_context: None,
            yield_hash: has_ctx.then_some(&mut accumulation.yield_hash),
            provisions: has_ctx.then_some(&mut accumulation.provisions),
            xfers: has_ctx.then_some(&mut accumulation.pending_xfers),
            accumulation_state: has_ctx.then_some(&mut accumulation.regular_state),
            num_validators: (accumulation.num_validators > 0).then_some(accumulation.num_validators),
            checkpoint_requested: has_ctx.then_some(&mut accumulation.checkpoint_requested),
            num_cores: (accumulation.num_cores > 0).then_some(accumulation.num_cores),
            fetch_entropy_accumulator: accumulation.entropy_accumulator.as_deref(),
            fetch_authorizer_trace: None,
            fetch_export_segments: None,
            fetch_import_segments: None,
            fetch_work_item_index: None,
            fetch_accumulate_inputs: (!accumulation.accumulate_inputs_encoded.is_empty())
                .then(|| accumulation.accumulate_inputs_encoded.as_slice()),
            fetch_work_package_encoded: accumulation.work_package_encoded.as_deref(),
            fetch_auth_config: accumulation.auth_config.as_deref(),
            fetch_auth_token: accumulation.auth_token.as_deref(),
            fetch_refine_context_encoded: accumulation.refine_context_encoded.as_deref(),
            fetch_work_item_summaries: accumulation.work_item_summaries.as_deref(),
            fetch_work_item_payloads: accumulation.work_item_payloads.as_deref(),
            log_messages: Some(&mut self.log_messages),
            fetch_system_constants_config: accumulation.fetch_config.as_ref(),
        };
        let host_result = handler.execute(&mut host_ctx);

        if self.accumulation.checkpoint_requested {
            if let Some(snapshot) = self.build_current_regular_implications() {
                self.accumulation.implications_exceptional = Some(snapshot);
            }
            self.accumulation.checkpoint_requested = false;
        }

        if host_result.should_continue() {
            self.program_counter = pc + instruction_length as u32;
            return true;
        }
        self.status = match host_result.result_code {
            x if x == RESULT_CODE_HALT => Status::Halt,
            x if x == RESULT_CODE_PANIC => Status::Panic,
            x if x == RESULT_CODE_FAULT => Status::Fault,
            x if x == RESULT_CODE_OOG => Status::Oog,
            _ => Status::Panic,
        };
        self.result_code = host_result.result_code;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deblob of a single TRAP: gas=1000 yields PANIC after consuming exactly 1 gas.
    #[test]
    fn trap_panics_and_consumes_one_gas() {
        let mut pvm = Pvm::new(RamKind::Paged);
        pvm.gas_left = 1000;
        pvm.run_blob(&[0x00, 0x00, 0x01, 0x00, 0x01]);
        assert_eq!(pvm.result_code, RESULT_CODE_PANIC);
        assert_eq!(pvm.program_counter, 0);
        assert_eq!(1000 - pvm.gas_left, 1);
    }

    #[test]
    fn reset_clears_accumulation_context() {
        let mut pvm = Pvm::new(RamKind::Paged);
        pvm.has_accumulation_context = true;
        pvm.accumulation.yield_hash = Some(vec![1; 32]);
        pvm.reset();
        assert!(!pvm.has_accumulation_context());
        assert!(pvm.yield_hash().is_none());
    }
}
