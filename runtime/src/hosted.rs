use std::{
    io::{self, Read, Write},
    process, thread,
    time::Duration,
};

/// Lee un byte de la entrada estándar, o `None` al final de la entrada.
pub fn read_byte() -> Option<u8> {
    flush();
    read_from(&mut io::stdin().lock())
}

fn read_from<R: Read>(input: &mut R) -> Option<u8> {
    let mut byte = [0];
    loop {
        match input.read(&mut byte) {
            Ok(1) => return Some(byte[0]),
            Ok(_) => return None,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,

            // El programa continúa como si la entrada hubiera terminado
            Err(error) => {
                report(&format!("Input error: {}", error));
                return None;
            }
        }
    }
}

pub fn write(bytes: &[u8]) {
    // Un stdout cerrado no es una falla del programa
    let _ = io::stdout().lock().write_all(bytes);
}

pub fn flush() {
    let _ = io::stdout().lock().flush();
}

pub fn sleep(seconds: u32) {
    flush();
    thread::sleep(Duration::from_secs(u64::from(seconds)));
}

pub fn report(message: &str) {
    flush();
    eprintln!("{}", message);
}

pub fn exit(status: i32) -> ! {
    flush();
    process::exit(status)
}
