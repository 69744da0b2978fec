use std::cell::RefCell;
use std::rc::Rc;

use clap::Parser;
use clap_num::maybe_hex;

use mos6502_jit::Hal;
use mos6502_jit::MemoryBus;
use mos6502_jit::Ram;
use mos6502_jit::RegisterFile;
use mos6502_jit::Rom;
use mos6502_jit::Scheduler;
use mos6502_jit::StdHal;

const RESET_VECTOR: u16 = 0xFFFC;
const MAX_MEMORY_SIZE: usize = 0x10000;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Paths to the files to seed memory with.
    ///
    /// Format is (path[:load_addr_hex_no_0x],)+, load addresses must
    /// increase, and the loaded files must not overlap.
    mem_file_list: String,
    /// ROM start. Writes at or above this address are rejected.
    #[arg(long, default_value_t = 0xffff, value_parser=maybe_hex::<u16>)]
    rom_start: u16,
    /// Initial program counter, written into the reset vector.
    #[arg(long, default_value_t = 0x400, value_parser=maybe_hex::<u16>)]
    reset_pc: u16,
    /// Program counter at which to stop dispatching. Runs until a HAL
    /// error unwinds the loop if omitted.
    #[arg(long, value_parser=maybe_hex::<u16>)]
    exit_pc: Option<u16>,
}

fn load_memory_image(mem_file_list: &str) -> anyhow::Result<Vec<u8>> {
    let mut memory = vec![];
    for file_path_addr in mem_file_list.split(',') {
        let mut file_path_addr = file_path_addr.split(':');

        let file_path = file_path_addr
            .next()
            .ok_or_else(|| anyhow::anyhow!("unexpected format of the memory file list"))?;
        log::info!("reading memory contents from {file_path}");
        let chunk = std::fs::read(file_path)?;
        log::info!("read {:#06x} bytes", chunk.len());

        if let Some(addr) = file_path_addr.next() {
            let addr = u16::from_str_radix(addr, 16)
                .map_err(|_| anyhow::anyhow!("load address {addr} isn't an unadorned 16-bit hex number"))?;
            if memory.len() > addr as usize {
                anyhow::bail!("load addresses must increase");
            }
            memory.resize(addr as usize, 0);
        }
        log::info!("loading at {:#06x}", memory.len());
        memory.extend_from_slice(&chunk);
    }

    if memory.len() > MAX_MEMORY_SIZE {
        anyhow::bail!("loaded {:#06x} bytes, maximum memory size is {MAX_MEMORY_SIZE:#06x} bytes", memory.len());
    }
    memory.resize(MAX_MEMORY_SIZE, 0);

    Ok(memory)
}

fn main() -> anyhow::Result<()> {
    init_logger();
    let args = Args::parse();

    let mut memory = load_memory_image(&args.mem_file_list)?;

    log::info!("setting reset vector to {:#06x}", args.reset_pc);
    memory[RESET_VECTOR as usize] = args.reset_pc as u8;
    memory[RESET_VECTOR as usize + 1] = (args.reset_pc >> 8) as u8;

    let rom_start = (args.rom_start as usize).min(MAX_MEMORY_SIZE);
    let (ram_image, rom_image) = memory.split_at(rom_start);

    let mut bus = MemoryBus::new();
    bus.attach(Ram::from_bytes(ram_image.to_vec()), 0x0000, false)?;
    if !rom_image.is_empty() {
        bus.attach(Rom::from_bytes(rom_image.to_vec()), args.rom_start, false)?;
    }
    let bus = Rc::new(RefCell::new(bus));

    let mut scheduler = Scheduler::new();

    if let Some(exit_pc) = args.exit_pc {
        log::info!("will stop dispatch at {exit_pc:#06x}");
        scheduler.patches_mut().install(exit_pc, Box::new(|_hal| Some(-1)));
    }

    let pending = scheduler.pending_writes_handle();
    let mut notify = move |current: u16, written: u16| pending.borrow_mut().push_back((current, written));
    let mut cancelled = || false;
    let mut poll = || 0u16;
    let mut hal = StdHal::new(RegisterFile::default(), Rc::clone(&bus), &mut notify, &mut cancelled, &mut poll);

    let fetch_regions = {
        let bus = Rc::clone(&bus);
        move || -> Vec<(u16, Vec<u8>)> {
            bus.borrow().enumerate_code_regions().map(|(base, bytes)| (base, bytes.to_vec())).collect()
        }
    };

    log::info!("running mos6502_jit from {:#06x}", args.reset_pc);
    let result = scheduler.run_method(args.reset_pc, &mut hal, fetch_regions);

    log::info!("{:04x?}", hal.registers());
    match result {
        Ok(()) => {
            log::info!("stopped after dispatching {:#06x}", hal.current_instruction_address());
            Ok(())
        }
        Err(err) => {
            log::error!("{err}");
            anyhow::bail!("run error: {err}");
        }
    }
}

fn init_logger() {
    env_logger::init_from_env(env_logger::Env::default().filter_or("MOS6502_JIT_LOG", "info"));
}
