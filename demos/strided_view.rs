use arcwise::approx::bit_identical;
use arcwise::ops::indexer::c_contiguous_strides;
use arcwise::{ElementType, ElementwiseFunction, Operand, Queue, QueueConfig, SharedBuffer};
use num_complex::Complex;

const ROWS: usize = 64;
const COLS: usize = 48;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let queue = Queue::new(QueueConfig::from_env())?;
    println!("queue: {queue:?}");

    // row-major matrix of complex values inside the unit disc
    let data: Vec<Complex<f32>> = (0..ROWS * COLS)
        .map(|k| {
            let t = k as f32 / (ROWS * COLS) as f32;
            Complex::from_polar(0.95 * t, 40.0 * t)
        })
        .collect();
    let matrix = SharedBuffer::from_slice(&data);

    // transposed copy made on the host
    let mut transposed = vec![Complex::new(0.0f32, 0.0); ROWS * COLS];
    for i in 0..ROWS {
        for j in 0..COLS {
            transposed[j * ROWS + i] = data[i * COLS + j];
        }
    }
    let dense = SharedBuffer::from_slice(&transposed);

    let from_view = SharedBuffer::zeroed(ElementType::Complex64, ROWS * COLS);
    let from_dense = SharedBuffer::zeroed(ElementType::Complex64, ROWS * COLS);

    let shape = [COLS, ROWS];
    let out_strides = c_contiguous_strides(&shape);
    let view_strides = [1, COLS as isize];

    let strided = ElementwiseFunction::Atanh.unary_strided(
        &queue,
        ROWS * COLS,
        &shape,
        Operand::new(&matrix).with_strides(&view_strides),
        Operand::new(&from_view).with_strides(&out_strides),
        &[],
        &[],
    )?;
    let contig = ElementwiseFunction::Atanh.unary_contig(
        &queue,
        ROWS * COLS,
        Operand::new(&dense),
        Operand::new(&from_dense),
        &[],
    )?;
    arcwise::Event::wait_all([&strided, &contig])?;

    let a = from_view.to_vec::<Complex<f32>>()?;
    let b = from_dense.to_vec::<Complex<f32>>()?;
    println!(
        "atanh over a transposed {ROWS}x{COLS} view: bit-identical to the dense copy = {}",
        bit_identical(&a[..], &b[..])
    );
    Ok(())
}
