use arcwise::approx::{RelativeEq, Ulps};
use arcwise::{ElementType, ElementwiseFunction, Operand, Queue, SharedBuffer};
use num_complex::Complex;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // a point far up the imaginary axis, where atan approaches pi/2
    let z = Complex::new(1.0f64, 64_387_093.0);

    let queue = Queue::default_queue()?;
    let input = SharedBuffer::from_slice(&[z]);
    let output = SharedBuffer::zeroed(ElementType::Complex128, 1);

    ElementwiseFunction::Atan
        .unary_contig(queue, 1, Operand::new(&input), Operand::new(&output), &[])?
        .wait()?;

    let device = output.to_vec::<Complex<f64>>()?[0];
    let host = z.atan();

    println!("z              = {z}");
    println!("queue  atan(z) = ({:.17e}, {:.17e})", device.re, device.im);
    println!("host   atan(z) = ({:.17e}, {:.17e})", host.re, host.im);
    println!(
        "ulps (re, im)  = ({:?}, {:?})",
        device.re.ulps(host.re),
        device.im.ulps(host.im)
    );
    println!("rating         = {:?}", device.approx_eq(&host));
    Ok(())
}
